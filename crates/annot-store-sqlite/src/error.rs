//! Error type for `annot-store-sqlite`.

use annot_core::{candidate::CandidateId, key::KeyId};
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] annot_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("annotation key {0:?} already exists")]
  DuplicateKeyName(String),

  #[error("{table} already exists for key {key_id} and candidate {candidate_id}")]
  DuplicateAnnotation {
    table:        &'static str,
    key_id:       KeyId,
    candidate_id: CandidateId,
  },

  /// The key or the candidate an annotation points at does not exist.
  #[error("{table} references a missing key {key_id} or candidate {candidate_id}")]
  MissingReference {
    table:        &'static str,
    key_id:       KeyId,
    candidate_id: CandidateId,
  },

  /// The value could not be stored; SQLite binds a NaN float as `NULL`.
  #[error("{table} value for key {key_id} and candidate {candidate_id} is not a number")]
  NullValue {
    table:        &'static str,
    key_id:       KeyId,
    candidate_id: CandidateId,
  },

  #[error("annotation kind table {0:?} is reserved or not a plain lowercase identifier")]
  InvalidKindTable(&'static str),

  #[error("stable label by {annotator_name:?} for {context_stable_ids:?} already exists")]
  DuplicateStableLabel {
    context_stable_ids: String,
    annotator_name:     String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Relational constraint classes surfaced by SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
  /// `UNIQUE` or `PRIMARY KEY`.
  Unique,
  ForeignKey,
  NotNull,
}

/// Classify a failed statement. Returns `None` if the error is not a
/// unique, foreign key or not-null violation.
pub fn constraint_violation(err: &tokio_rusqlite::Error) -> Option<Constraint> {
  let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) = err
  else {
    return None;
  };
  if e.code != rusqlite::ErrorCode::ConstraintViolation {
    return None;
  }
  match e.extended_code {
    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
      Some(Constraint::Unique)
    }
    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Constraint::ForeignKey),
    ffi::SQLITE_CONSTRAINT_NOTNULL => Some(Constraint::NotNull),
    _ => None,
  }
}
