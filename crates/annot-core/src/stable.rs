//! Stable labels: human labels that survive candidate regeneration.
//!
//! A stable label is keyed by the stable ids of the contexts a candidate spans
//! rather than by the candidate's surrogate id, and has no foreign keys. When
//! candidates are deleted and extracted again, stable labels stay behind and
//! can be matched to the new candidates by their context ids.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const STABLE_ID_DELIMITER: &str = "~~";

// ─── ContextStableIds ────────────────────────────────────────────────────────

/// An id can be joined and split back unchanged only if it is non-empty, has
/// no delimiter inside it, and does not begin or end with `~` (otherwise
/// `["a~", "b"]` and `["a", "~b"]` would both join to `a~~~b`).
fn is_joinable(id: &str) -> bool {
  !id.is_empty()
    && !id.contains(STABLE_ID_DELIMITER)
    && !id.starts_with('~')
    && !id.ends_with('~')
}

/// Ordered list of context stable ids, stored `~~`-joined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextStableIds(Vec<String>);

impl ContextStableIds {
  pub fn new<I, S>(ids: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    if ids.is_empty() {
      return Err(Error::EmptyStableIds);
    }
    if let Some(bad) = ids.iter().find(|id| !is_joinable(id)) {
      return Err(Error::InvalidStableId(bad.clone()));
    }
    Ok(Self(ids))
  }

  pub fn ids(&self) -> &[String] { &self.0 }

  /// The stored column form.
  pub fn joined(&self) -> String { self.0.join(STABLE_ID_DELIMITER) }
}

impl fmt::Display for ContextStableIds {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.joined())
  }
}

impl FromStr for ContextStableIds {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    if s.is_empty() {
      return Err(Error::EmptyStableIds);
    }
    Self::new(s.split(STABLE_ID_DELIMITER))
  }
}

impl TryFrom<String> for ContextStableIds {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<ContextStableIds> for String {
  fn from(ids: ContextStableIds) -> Self { ids.joined() }
}

// ─── StableLabel ─────────────────────────────────────────────────────────────

/// A label by a named human annotator, independent of candidate ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableLabel {
  pub context_stable_ids: ContextStableIds,
  pub annotator_name:     String,
  #[serde(default)]
  pub split:              i64,
  pub value:              i64,
}

impl StableLabel {
  /// A label in split 0.
  pub fn new(
    context_stable_ids: ContextStableIds,
    annotator_name: impl Into<String>,
    value: i64,
  ) -> Self {
    Self {
      context_stable_ids,
      annotator_name: annotator_name.into(),
      split: 0,
      value,
    }
  }

  pub fn with_split(mut self, split: i64) -> Self {
    self.split = split;
    self
  }
}

impl fmt::Display for StableLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "StableLabel ({} : {})", self.annotator_name, self.value)
  }
}
