//! Conversions between SQLite rows and the `annot-core` records.

use annot_core::{
  annotation::{Annotation, AnnotationKind, AnnotationValue, Value},
  candidate::Candidate,
  key::AnnotationKey,
  stable::StableLabel,
};
use rusqlite::{Row, types::Value as SqlValue};

use crate::Result;

// ─── Values ──────────────────────────────────────────────────────────────────

pub fn encode_value<V: Value>(value: V) -> SqlValue {
  match value.into_value() {
    AnnotationValue::Integer(v) => SqlValue::Integer(v),
    AnnotationValue::Float(v) => SqlValue::Real(v),
  }
}

pub fn decode_value<K: AnnotationKind>(raw: SqlValue) -> Result<K::Value> {
  let value = match raw {
    SqlValue::Integer(v) => Some(AnnotationValue::Integer(v)),
    SqlValue::Real(v) => Some(AnnotationValue::Float(v)),
    SqlValue::Null | SqlValue::Text(_) | SqlValue::Blob(_) => None,
  };
  value
    .and_then(K::Value::from_value)
    .ok_or_else(|| {
      annot_core::Error::ValueType {
        table:    K::TABLE,
        expected: K::Value::COLUMN.name(),
      }
      .into()
    })
}

// ─── Row readers ─────────────────────────────────────────────────────────────

/// Reads `id, name`.
pub fn key_from_row(row: &Row<'_>) -> rusqlite::Result<AnnotationKey> {
  Ok(AnnotationKey { id: row.get(0)?, name: row.get(1)? })
}

/// Reads `id, split`.
pub fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
  Ok(Candidate { id: row.get(0)?, split: row.get(1)? })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// An annotation row joined with its key, before the value is typed.
pub struct RawAnnotation {
  pub key_id:       i64,
  pub key_name:     String,
  pub candidate_id: i64,
  pub value:        SqlValue,
}

impl RawAnnotation {
  /// Reads `key_id, key_name, candidate_id, value`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key_id:       row.get(0)?,
      key_name:     row.get(1)?,
      candidate_id: row.get(2)?,
      value:        row.get(3)?,
    })
  }

  pub fn into_annotation<K: AnnotationKind>(self) -> Result<Annotation<K>> {
    Ok(Annotation {
      key:          AnnotationKey { id: self.key_id, name: self.key_name },
      candidate_id: self.candidate_id,
      value:        decode_value::<K>(self.value)?,
    })
  }
}

/// Raw columns of a `stable_label` row.
pub struct RawStableLabel {
  pub context_stable_ids: String,
  pub annotator_name:     String,
  /// Nullable in older stores; `NULL` reads as split 0.
  pub split:              Option<i64>,
  pub value:              i64,
}

impl RawStableLabel {
  /// Reads `context_stable_ids, annotator_name, split, value`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      context_stable_ids: row.get(0)?,
      annotator_name:     row.get(1)?,
      split:              row.get(2)?,
      value:              row.get(3)?,
    })
  }

  pub fn into_stable_label(self) -> Result<StableLabel> {
    Ok(StableLabel {
      context_stable_ids: self.context_stable_ids.parse()?,
      annotator_name:     self.annotator_name,
      split:              self.split.unwrap_or(0),
      value:              self.value,
    })
  }
}
