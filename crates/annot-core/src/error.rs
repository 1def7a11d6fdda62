//! Error types for `annot-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("context stable id list is empty")]
  EmptyStableIds,

  #[error("context stable id {0:?} is empty, contains \"~~\", or starts or ends with \"~\"")]
  InvalidStableId(String),

  #[error("unknown annotation type: {0:?}")]
  UnknownAnnotationType(String),

  /// A stored value could not be read back as the kind's value type.
  #[error("{table} value has the wrong type: expected {expected}")]
  ValueType {
    table:    &'static str,
    expected: &'static str,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
