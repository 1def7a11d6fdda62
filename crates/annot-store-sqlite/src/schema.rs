//! SQL schema for the annotation store.
//!
//! Executed once at connection startup. Every statement is idempotent, and
//! `PRAGMA user_version` records [`SCHEMA_VERSION`] for future migrations.
//!
//! Annotation tables are generated from an [`AnnotationKind`] so that every
//! kind shares the same keys and cascade rules and differs only in its table
//! name and the type of its `value` column. The built-in kinds are part of
//! [`schema`]; other kinds get their table from
//! [`SqliteStore::register_kind`](crate::SqliteStore::register_kind).

use annot_core::annotation::{AnnotationKind, Feature, Label, Prediction, Value};

pub const SCHEMA_VERSION: i64 = 1;

const BASE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Producer names (annotators, labeling functions, models) to integer ids.
CREATE TABLE IF NOT EXISTS annotation_key (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

-- Only the columns annotations need; the framework owns the full model.
CREATE TABLE IF NOT EXISTS candidate (
    id    INTEGER PRIMARY KEY,
    split INTEGER NOT NULL DEFAULT 0
);

-- No foreign keys: rows outlive the candidates they were made against.
CREATE TABLE IF NOT EXISTS stable_label (
    context_stable_ids TEXT    NOT NULL,   -- '~~'-joined
    annotator_name     TEXT    NOT NULL,
    split              INTEGER DEFAULT 0,   -- NULL reads as 0
    value              INTEGER NOT NULL,
    PRIMARY KEY (context_stable_ids, annotator_name)
);

CREATE INDEX IF NOT EXISTS stable_label_annotator_idx ON stable_label(annotator_name);
";

/// Tables owned by the base schema; annotation kinds may not reuse them.
const RESERVED_TABLES: [&str; 3] = ["annotation_key", "candidate", "stable_label"];

/// Whether `table` can be spliced into SQL as an annotation table name.
pub fn is_valid_table_name(table: &str) -> bool {
  let mut chars = table.chars();
  let Some(first) = chars.next() else {
    return false;
  };
  (first.is_ascii_lowercase() || first == '_')
    && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    && !RESERVED_TABLES.contains(&table)
    && !table.starts_with("sqlite_")
}

/// DDL for the table of kind `K` and its candidate index.
pub fn annotation_table<K: AnnotationKind>() -> String {
  let table = K::TABLE;
  let value_type = K::Value::COLUMN.sql_type();
  format!(
    "
CREATE TABLE IF NOT EXISTS {table} (
    key_id       INTEGER NOT NULL REFERENCES annotation_key(id) ON DELETE CASCADE,
    candidate_id INTEGER NOT NULL REFERENCES candidate(id)      ON DELETE CASCADE,
    value        {value_type} NOT NULL,
    PRIMARY KEY (key_id, candidate_id)
);

CREATE INDEX IF NOT EXISTS {table}_candidate_idx ON {table}(candidate_id);
"
  )
}

/// Full schema DDL, including the built-in annotation kinds.
pub fn schema() -> String {
  let mut sql = String::from(BASE_SCHEMA);
  sql.push_str(&annotation_table::<Label>());
  sql.push_str(&annotation_table::<Feature>());
  sql.push_str(&annotation_table::<Prediction>());
  sql.push_str(&format!("\nPRAGMA user_version = {SCHEMA_VERSION};\n"));
  sql
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_table_uses_integer_values() {
    let ddl = annotation_table::<Label>();
    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS label ("));
    assert!(ddl.contains("value        INTEGER NOT NULL"));
    assert!(ddl.contains("PRIMARY KEY (key_id, candidate_id)"));
  }

  #[test]
  fn feature_and_prediction_use_real_values() {
    assert!(annotation_table::<Feature>().contains("value        REAL NOT NULL"));
    assert!(annotation_table::<Prediction>().contains("value        REAL NOT NULL"));
  }

  #[test]
  fn schema_covers_every_table() {
    let sql = schema();
    for table in ["annotation_key", "candidate", "stable_label", "label", "feature", "prediction"] {
      assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")), "{table}");
    }
    assert!(sql.trim_end().ends_with("PRAGMA user_version = 1;"));
  }

  #[test]
  fn table_name_validation() {
    for ok in ["marginal", "gold_label", "_tmp2"] {
      assert!(is_valid_table_name(ok), "{ok}");
    }
    for bad in ["", "Marginal", "2nd", "x; DROP TABLE label", "candidate", "sqlite_master"] {
      assert!(!is_valid_table_name(bad), "{bad}");
    }
  }
}
