//! [`SqliteStore`], the SQLite implementation of [`AnnotationStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use annot_core::{
  annotation::{Annotation, AnnotationKind, NewAnnotation},
  candidate::{Candidate, CandidateId},
  key::{AnnotationKey, KeyId},
  stable::{ContextStableIds, StableLabel},
  store::{AnnotationStore, StableLabelQuery, StoreStats},
};

use crate::{
  Error, Result,
  encode::{RawAnnotation, RawStableLabel, candidate_from_row, encode_value, key_from_row},
  error::{Constraint, constraint_violation},
  schema,
};

// ─── SQL helpers ─────────────────────────────────────────────────────────────

/// `SELECT` over one annotation table joined with its key, yielding the
/// columns [`RawAnnotation::from_row`] expects.
fn select_annotations(table: &str, filter: &str, order: &str) -> String {
  format!(
    "SELECT k.id, k.name, a.candidate_id, a.value
     FROM {table} a
     JOIN annotation_key k ON k.id = a.key_id
     WHERE {filter}
     ORDER BY {order}"
  )
}

fn read_annotation(
  conn: &rusqlite::Connection,
  table: &str,
  key_id: KeyId,
  candidate_id: CandidateId,
) -> rusqlite::Result<RawAnnotation> {
  conn.query_row(
    &select_annotations(table, "a.key_id = ?1 AND a.candidate_id = ?2", "k.id"),
    rusqlite::params![key_id, candidate_id],
    RawAnnotation::from_row,
  )
}

fn annotation_write_error(
  err: tokio_rusqlite::Error,
  table: &'static str,
  key_id: KeyId,
  candidate_id: CandidateId,
) -> Error {
  match constraint_violation(&err) {
    Some(Constraint::Unique) => Error::DuplicateAnnotation { table, key_id, candidate_id },
    Some(Constraint::ForeignKey) => {
      Error::MissingReference { table, key_id, candidate_id }
    }
    Some(Constraint::NotNull) => Error::NullValue { table, key_id, candidate_id },
    None => Error::Database(err),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An annotation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let sql = schema::schema();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    tracing::debug!(version = schema::SCHEMA_VERSION, "annotation schema ready");
    Ok(())
  }

  /// Create the table for an annotation kind outside the built-in three.
  /// Idempotent; built-in kinds are already present after [`open`](Self::open).
  pub async fn register_kind<K: AnnotationKind>(&self) -> Result<()> {
    if !schema::is_valid_table_name(K::TABLE) {
      return Err(Error::InvalidKindTable(K::TABLE));
    }
    let ddl = schema::annotation_table::<K>();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    tracing::debug!(kind = K::NAME, table = K::TABLE, "annotation kind registered");
    Ok(())
  }

  /// Shared body of insert and upsert; `conflict` is appended to the
  /// `INSERT` statement.
  async fn write_annotation<K: AnnotationKind>(
    &self,
    new: NewAnnotation<K>,
    conflict: &'static str,
  ) -> Result<Annotation<K>> {
    let table = K::TABLE;
    let NewAnnotation { key_id, candidate_id, value } = new;
    let value = encode_value(value);

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO {table} (key_id, candidate_id, value) VALUES (?1, ?2, ?3) {conflict}"
          ),
          rusqlite::params![key_id, candidate_id, value],
        )?;
        Ok(read_annotation(conn, table, key_id, candidate_id)?)
      })
      .await
      .map_err(|e| annotation_write_error(e, table, key_id, candidate_id))?;

    raw.into_annotation()
  }

  async fn list_annotations<K: AnnotationKind>(
    &self,
    filter: &'static str,
    order: &'static str,
    id: i64,
  ) -> Result<Vec<Annotation<K>>> {
    let table = K::TABLE;

    let raws: Vec<RawAnnotation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&select_annotations(table, filter, order))?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawAnnotation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnnotation::into_annotation).collect()
  }

  async fn write_stable_label(
    &self,
    label: StableLabel,
    conflict: &'static str,
  ) -> Result<()> {
    let ids_str = label.context_stable_ids.joined();
    let annotator = label.annotator_name;
    let (split, value) = (label.split, label.value);

    let (ids_for_err, annotator_for_err) = (ids_str.clone(), annotator.clone());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO stable_label (context_stable_ids, annotator_name, split, value)
             VALUES (?1, ?2, ?3, ?4) {conflict}"
          ),
          rusqlite::params![ids_str, annotator, split, value],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| match constraint_violation(&e) {
        Some(Constraint::Unique) => Error::DuplicateStableLabel {
          context_stable_ids: ids_for_err,
          annotator_name:     annotator_for_err,
        },
        _ => Error::Database(e),
      })
  }
}

// ─── AnnotationStore impl ────────────────────────────────────────────────────

impl AnnotationStore for SqliteStore {
  type Error = Error;

  // ── Keys ──────────────────────────────────────────────────────────────────

  async fn create_key<'a>(&'a self, name: &'a str) -> Result<AnnotationKey> {
    let name = name.to_owned();
    let name_for_err = name.clone();

    let key = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO annotation_key (name) VALUES (?1)",
          rusqlite::params![name],
        )?;
        Ok(AnnotationKey { id: conn.last_insert_rowid(), name })
      })
      .await
      .map_err(|e| match constraint_violation(&e) {
        Some(Constraint::Unique) => Error::DuplicateKeyName(name_for_err),
        _ => Error::Database(e),
      })?;

    tracing::debug!(id = key.id, name = %key.name, "created annotation key");
    Ok(key)
  }

  async fn get_or_create_key<'a>(&'a self, name: &'a str) -> Result<AnnotationKey> {
    let name = name.to_owned();

    let key = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO annotation_key (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
          rusqlite::params![name],
        )?;
        Ok(conn.query_row(
          "SELECT id, name FROM annotation_key WHERE name = ?1",
          rusqlite::params![name],
          key_from_row,
        )?)
      })
      .await?;

    Ok(key)
  }

  async fn get_key<'a>(&'a self, name: &'a str) -> Result<Option<AnnotationKey>> {
    let name = name.to_owned();

    let key = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, name FROM annotation_key WHERE name = ?1",
            rusqlite::params![name],
            key_from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(key)
  }

  async fn get_key_by_id(&self, id: KeyId) -> Result<Option<AnnotationKey>> {
    let key = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, name FROM annotation_key WHERE id = ?1",
            rusqlite::params![id],
            key_from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(key)
  }

  async fn list_keys(&self) -> Result<Vec<AnnotationKey>> {
    let keys = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT id, name FROM annotation_key ORDER BY id")?;
        let rows = stmt
          .query_map([], key_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(keys)
  }

  async fn delete_key<'a>(&'a self, name: &'a str) -> Result<bool> {
    let name = name.to_owned();
    let name_for_log = name.clone();

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM annotation_key WHERE name = ?1",
          rusqlite::params![name],
        )?)
      })
      .await?;

    if removed > 0 {
      tracing::debug!(name = %name_for_log, "deleted annotation key and its annotations");
    }
    Ok(removed > 0)
  }

  // ── Candidates ────────────────────────────────────────────────────────────

  async fn add_candidate(&self, split: i64) -> Result<Candidate> {
    let candidate = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO candidate (split) VALUES (?1)",
          rusqlite::params![split],
        )?;
        Ok(Candidate { id: conn.last_insert_rowid(), split })
      })
      .await?;

    Ok(candidate)
  }

  async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
    let candidate = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, split FROM candidate WHERE id = ?1",
            rusqlite::params![id],
            candidate_from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(candidate)
  }

  async fn delete_candidate(&self, id: CandidateId) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM candidate WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;

    if removed > 0 {
      tracing::debug!(candidate_id = id, "deleted candidate and its annotations");
    }
    Ok(removed > 0)
  }

  // ── Annotations ───────────────────────────────────────────────────────────

  async fn insert_annotation<K: AnnotationKind>(
    &self,
    new: NewAnnotation<K>,
  ) -> Result<Annotation<K>> {
    self.write_annotation(new, "").await
  }

  async fn upsert_annotation<K: AnnotationKind>(
    &self,
    new: NewAnnotation<K>,
  ) -> Result<Annotation<K>> {
    self
      .write_annotation(
        new,
        "ON CONFLICT (key_id, candidate_id) DO UPDATE SET value = excluded.value",
      )
      .await
  }

  async fn get_annotation<K: AnnotationKind>(
    &self,
    key_id: KeyId,
    candidate_id: CandidateId,
  ) -> Result<Option<Annotation<K>>> {
    let table = K::TABLE;

    let raw = self
      .conn
      .call(move |conn| {
        Ok(read_annotation(conn, table, key_id, candidate_id).optional()?)
      })
      .await?;

    raw.map(RawAnnotation::into_annotation).transpose()
  }

  async fn annotations_for_candidate<K: AnnotationKind>(
    &self,
    candidate_id: CandidateId,
  ) -> Result<Vec<Annotation<K>>> {
    self
      .list_annotations("a.candidate_id = ?1", "k.id", candidate_id)
      .await
  }

  async fn annotations_for_key<K: AnnotationKind>(
    &self,
    key_id: KeyId,
  ) -> Result<Vec<Annotation<K>>> {
    self
      .list_annotations("a.key_id = ?1", "a.candidate_id", key_id)
      .await
  }

  async fn delete_annotation<K: AnnotationKind>(
    &self,
    key_id: KeyId,
    candidate_id: CandidateId,
  ) -> Result<bool> {
    let table = K::TABLE;

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!("DELETE FROM {table} WHERE key_id = ?1 AND candidate_id = ?2"),
          rusqlite::params![key_id, candidate_id],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  // ── Stable labels ─────────────────────────────────────────────────────────

  async fn insert_stable_label(&self, label: StableLabel) -> Result<()> {
    self.write_stable_label(label, "").await
  }

  async fn upsert_stable_label(&self, label: StableLabel) -> Result<()> {
    self
      .write_stable_label(
        label,
        "ON CONFLICT (context_stable_ids, annotator_name)
         DO UPDATE SET split = excluded.split, value = excluded.value",
      )
      .await
  }

  async fn get_stable_label<'a>(
    &'a self,
    context_stable_ids: &'a ContextStableIds,
    annotator_name: &'a str,
  ) -> Result<Option<StableLabel>> {
    let ids_str = context_stable_ids.joined();
    let annotator = annotator_name.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT context_stable_ids, annotator_name, split, value
             FROM stable_label
             WHERE context_stable_ids = ?1 AND annotator_name = ?2",
            rusqlite::params![ids_str, annotator],
            RawStableLabel::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawStableLabel::into_stable_label).transpose()
  }

  async fn list_stable_labels<'a>(
    &'a self,
    query: &'a StableLabelQuery,
  ) -> Result<Vec<StableLabel>> {
    let annotator = query.annotator_name.clone();
    let split = query.split;

    let raws: Vec<RawStableLabel> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT context_stable_ids, annotator_name, split, value
           FROM stable_label
           WHERE (?1 IS NULL OR annotator_name = ?1)
             AND (?2 IS NULL OR COALESCE(split, 0) = ?2)
           ORDER BY annotator_name, context_stable_ids",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![annotator, split], RawStableLabel::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStableLabel::into_stable_label).collect()
  }

  async fn delete_stable_label<'a>(
    &'a self,
    context_stable_ids: &'a ContextStableIds,
    annotator_name: &'a str,
  ) -> Result<bool> {
    let ids_str = context_stable_ids.joined();
    let annotator = annotator_name.to_owned();

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM stable_label WHERE context_stable_ids = ?1 AND annotator_name = ?2",
          rusqlite::params![ids_str, annotator],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  // ── Stats ─────────────────────────────────────────────────────────────────

  async fn stats(&self) -> Result<StoreStats> {
    let counts: [i64; 6] = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM annotation_key),
             (SELECT COUNT(*) FROM candidate),
             (SELECT COUNT(*) FROM label),
             (SELECT COUNT(*) FROM feature),
             (SELECT COUNT(*) FROM prediction),
             (SELECT COUNT(*) FROM stable_label)",
          [],
          |row| {
            Ok([
              row.get(0)?,
              row.get(1)?,
              row.get(2)?,
              row.get(3)?,
              row.get(4)?,
              row.get(5)?,
            ])
          },
        )?)
      })
      .await?;

    let [keys, candidates, labels, features, predictions, stable_labels] =
      counts.map(|n| n as u64);
    Ok(StoreStats { keys, candidates, labels, features, predictions, stable_labels })
  }
}
