//! Annotation kinds and the records stored for them.
//!
//! An annotation is a value attached to a candidate by a named producer (an
//! [`AnnotationKey`]). Every annotation table shares the same layout:
//!
//! - `key_id`: references `annotation_key(id)`, cascades on delete
//! - `candidate_id`: references `candidate(id)`, cascades on delete
//! - `value`: not null; its column type depends on the kind
//!
//! with `(key_id, candidate_id)` as the primary key. A kind therefore only
//! needs to say what its table is called and what type its value has. New
//! kinds are added by implementing [`AnnotationKind`] on a marker type; the
//! storage backend creates their tables on registration.
//!
//! ```
//! use annot_core::annotation::AnnotationKind;
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Marginal;
//!
//! impl AnnotationKind for Marginal {
//!   const NAME: &'static str = "Marginal";
//!   const TABLE: &'static str = "marginal";
//!   const BACKREF: &'static str = "marginals";
//!   type Value = f64;
//! }
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, candidate::CandidateId, key::{AnnotationKey, KeyId}};

// ─── Column values ───────────────────────────────────────────────────────────

/// Storage type of an annotation `value` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
  Integer,
  Float,
}

impl ColumnType {
  pub fn sql_type(self) -> &'static str {
    match self {
      ColumnType::Integer => "INTEGER",
      ColumnType::Float => "REAL",
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      ColumnType::Integer => "integer",
      ColumnType::Float => "float",
    }
  }
}

/// A value as it crosses the storage boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationValue {
  Integer(i64),
  Float(f64),
}

/// Rust types usable as an annotation value.
pub trait Value:
  Copy + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
  const COLUMN: ColumnType;

  fn into_value(self) -> AnnotationValue;

  /// Returns `None` when the stored value cannot represent `Self`.
  fn from_value(value: AnnotationValue) -> Option<Self>;

  /// Renders the value inside an annotation's text form.
  fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(self, f)
  }
}

impl Value for i64 {
  const COLUMN: ColumnType = ColumnType::Integer;

  fn into_value(self) -> AnnotationValue { AnnotationValue::Integer(self) }

  fn from_value(value: AnnotationValue) -> Option<Self> {
    match value {
      AnnotationValue::Integer(v) => Some(v),
      AnnotationValue::Float(_) => None,
    }
  }
}

impl Value for f64 {
  const COLUMN: ColumnType = ColumnType::Float;

  fn into_value(self) -> AnnotationValue { AnnotationValue::Float(self) }

  fn from_value(value: AnnotationValue) -> Option<Self> {
    match value {
      AnnotationValue::Float(v) => Some(v),
      // SQLite may hand back whole REAL values as integers.
      AnnotationValue::Integer(v) => Some(v as f64),
    }
  }

  /// Whole floats keep a trailing `.0` so features read `3.0`, not `3`.
  fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_finite() && self.fract() == 0.0 && self.abs() < 1e16 {
      write!(f, "{self:.1}")
    } else {
      write!(f, "{self}")
    }
  }
}

// ─── Annotation types ────────────────────────────────────────────────────────

/// Runtime discriminant of the built-in kinds ([`Label`], [`Feature`],
/// [`Prediction`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
  Label,
  Feature,
  Prediction,
}

impl AnnotationType {
  pub const ALL: [AnnotationType; 3] =
    [AnnotationType::Label, AnnotationType::Feature, AnnotationType::Prediction];

  /// Record name, used when rendering annotations.
  pub fn name(self) -> &'static str {
    match self {
      AnnotationType::Label => "Label",
      AnnotationType::Feature => "Feature",
      AnnotationType::Prediction => "Prediction",
    }
  }

  /// Table name: the snake_case form of [`name`](Self::name).
  pub fn table(self) -> &'static str {
    match self {
      AnnotationType::Label => "label",
      AnnotationType::Feature => "feature",
      AnnotationType::Prediction => "prediction",
    }
  }

  /// Name of the collection on a key or candidate, e.g. `labels`.
  pub fn backref(self) -> &'static str {
    match self {
      AnnotationType::Label => "labels",
      AnnotationType::Feature => "features",
      AnnotationType::Prediction => "predictions",
    }
  }

  pub fn column(self) -> ColumnType {
    match self {
      AnnotationType::Label => ColumnType::Integer,
      AnnotationType::Feature | AnnotationType::Prediction => ColumnType::Float,
    }
  }
}

impl fmt::Display for AnnotationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.table())
  }
}

impl FromStr for AnnotationType {
  type Err = Error;

  /// Accepts the table name or the backreference name, in any case.
  fn from_str(s: &str) -> Result<Self> {
    let lower = s.to_ascii_lowercase();
    AnnotationType::ALL
      .into_iter()
      .find(|t| t.table() == lower || t.backref() == lower)
      .ok_or_else(|| Error::UnknownAnnotationType(s.to_owned()))
  }
}

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// Static description of one annotation table.
///
/// `TABLE` is spliced into SQL, so it must be a lowercase identifier
/// (`[a-z_][a-z0-9_]*`); backends reject anything else.
pub trait AnnotationKind:
  fmt::Debug + Clone + Copy + PartialEq + Send + Sync + 'static
{
  /// Record name, used when rendering annotations.
  const NAME: &'static str;

  /// Table name: the snake_case form of [`NAME`](Self::NAME).
  const TABLE: &'static str;

  /// Name of the collection on a key or candidate, e.g. `labels`.
  const BACKREF: &'static str;

  type Value: Value;
}

/// A discrete label indicating a target value for a candidate.
///
/// Used both for human-provided annotations and for labeling function
/// outputs; the key names the annotator or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Label;

impl AnnotationKind for Label {
  const NAME: &'static str = "Label";
  const TABLE: &'static str = "label";
  const BACKREF: &'static str = "labels";
  type Value = i64;
}

/// One element of a candidate's feature-space representation.
///
/// The key identifies the feature definition, e.g. a library and feature name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Feature;

impl AnnotationKind for Feature {
  const NAME: &'static str = "Feature";
  const TABLE: &'static str = "feature";
  const BACKREF: &'static str = "features";
  type Value = f64;
}

/// The degree of belief that a candidate is true.
///
/// The key identifies the model (and parameters) that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prediction;

impl AnnotationKind for Prediction {
  const NAME: &'static str = "Prediction";
  const TABLE: &'static str = "prediction";
  const BACKREF: &'static str = "predictions";
  type Value = f64;
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Input to [`AnnotationStore::insert_annotation`](crate::store::AnnotationStore::insert_annotation)
/// and friends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewAnnotation<K: AnnotationKind> {
  pub key_id:       KeyId,
  pub candidate_id: CandidateId,
  pub value:        K::Value,
}

impl<K: AnnotationKind> NewAnnotation<K> {
  pub fn new(key_id: KeyId, candidate_id: CandidateId, value: K::Value) -> Self {
    Self { key_id, candidate_id, value }
  }
}

/// A persisted annotation with its key resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation<K: AnnotationKind> {
  pub key:          AnnotationKey,
  pub candidate_id: CandidateId,
  pub value:        K::Value,
}

impl<K: AnnotationKind> Annotation<K> {
  pub fn key_id(&self) -> KeyId { self.key.id }
}

impl<K: AnnotationKind> fmt::Display for Annotation<K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({} = ", K::NAME, self.key.name)?;
    self.value.fmt_repr(f)?;
    f.write_str(")")
  }
}
