//! Annotation keys: the named producers of annotations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Surrogate id of an [`AnnotationKey`].
pub type KeyId = i64;

/// Maps a unique producer name (human annotator, labeling function, model) to
/// an integer id.
///
/// Keys are created once per distinct name and never mutated afterwards.
/// Deleting a key deletes every annotation it produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationKey {
  pub id:   KeyId,
  pub name: String,
}

impl fmt::Display for AnnotationKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "AnnotationKey ({})", self.name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_shows_name() {
    let key = AnnotationKey { id: 7, name: "lf_has_spouse_word".into() };
    assert_eq!(key.to_string(), "AnnotationKey (lf_has_spouse_word)");
  }
}
