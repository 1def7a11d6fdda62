//! The `AnnotationStore` trait and supporting query types.
//!
//! Storage backends (e.g. `annot-store-sqlite`) implement the trait; the rest
//! of the framework depends only on this abstraction.

use std::future::Future;

use serde::Serialize;

use crate::{
  annotation::{Annotation, AnnotationKind, NewAnnotation},
  candidate::{Candidate, CandidateId},
  key::{AnnotationKey, KeyId},
  stable::{ContextStableIds, StableLabel},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Filters for [`AnnotationStore::list_stable_labels`].
#[derive(Debug, Clone, Default)]
pub struct StableLabelQuery {
  pub annotator_name: Option<String>,
  pub split:          Option<i64>,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
  pub keys:          u64,
  pub candidates:    u64,
  pub labels:        u64,
  pub features:      u64,
  pub predictions:   u64,
  pub stable_labels: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an annotation store backend.
///
/// Referential rules every backend must uphold:
///
/// - key names are unique;
/// - at most one annotation per `(key, candidate)` pair per kind;
/// - deleting a key or a candidate deletes the annotations referencing it;
/// - stable labels reference nothing and are never deleted by cascade.
pub trait AnnotationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Keys ──────────────────────────────────────────────────────────────

  /// Insert a new key. Fails if `name` is already taken.
  fn create_key<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<AnnotationKey, Self::Error>> + Send + 'a;

  /// Return the key called `name`, creating it first if needed.
  fn get_or_create_key<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<AnnotationKey, Self::Error>> + Send + 'a;

  fn get_key<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<AnnotationKey>, Self::Error>> + Send + 'a;

  fn get_key_by_id(
    &self,
    id: KeyId,
  ) -> impl Future<Output = Result<Option<AnnotationKey>, Self::Error>> + Send + '_;

  /// All keys, ordered by id.
  fn list_keys(
    &self,
  ) -> impl Future<Output = Result<Vec<AnnotationKey>, Self::Error>> + Send + '_;

  /// Delete a key and every annotation it produced. Returns `false` if no key
  /// had that name.
  fn delete_key<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Candidates ────────────────────────────────────────────────────────

  fn add_candidate(
    &self,
    split: i64,
  ) -> impl Future<Output = Result<Candidate, Self::Error>> + Send + '_;

  fn get_candidate(
    &self,
    id: CandidateId,
  ) -> impl Future<Output = Result<Option<Candidate>, Self::Error>> + Send + '_;

  /// Delete a candidate and its labels, features and predictions. Stable
  /// labels are untouched.
  fn delete_candidate(
    &self,
    id: CandidateId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Annotations ───────────────────────────────────────────────────────

  /// Insert an annotation. Fails if the pair already has one, or if the key
  /// or candidate does not exist.
  fn insert_annotation<K: AnnotationKind>(
    &self,
    new: NewAnnotation<K>,
  ) -> impl Future<Output = Result<Annotation<K>, Self::Error>> + Send + '_;

  /// Insert an annotation or replace the value already stored for the pair.
  fn upsert_annotation<K: AnnotationKind>(
    &self,
    new: NewAnnotation<K>,
  ) -> impl Future<Output = Result<Annotation<K>, Self::Error>> + Send + '_;

  fn get_annotation<K: AnnotationKind>(
    &self,
    key_id: KeyId,
    candidate_id: CandidateId,
  ) -> impl Future<Output = Result<Option<Annotation<K>>, Self::Error>> + Send + '_;

  /// The candidate's annotations of kind `K`, ordered by key id.
  fn annotations_for_candidate<K: AnnotationKind>(
    &self,
    candidate_id: CandidateId,
  ) -> impl Future<Output = Result<Vec<Annotation<K>>, Self::Error>> + Send + '_;

  /// The key's annotations of kind `K`, ordered by candidate id.
  fn annotations_for_key<K: AnnotationKind>(
    &self,
    key_id: KeyId,
  ) -> impl Future<Output = Result<Vec<Annotation<K>>, Self::Error>> + Send + '_;

  fn delete_annotation<K: AnnotationKind>(
    &self,
    key_id: KeyId,
    candidate_id: CandidateId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Stable labels ─────────────────────────────────────────────────────

  /// Insert a stable label. Fails if the `(context_stable_ids,
  /// annotator_name)` pair is already labelled.
  fn insert_stable_label(
    &self,
    label: StableLabel,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert a stable label or overwrite the split and value of an existing one.
  fn upsert_stable_label(
    &self,
    label: StableLabel,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_stable_label<'a>(
    &'a self,
    context_stable_ids: &'a ContextStableIds,
    annotator_name: &'a str,
  ) -> impl Future<Output = Result<Option<StableLabel>, Self::Error>> + Send + 'a;

  fn list_stable_labels<'a>(
    &'a self,
    query: &'a StableLabelQuery,
  ) -> impl Future<Output = Result<Vec<StableLabel>, Self::Error>> + Send + 'a;

  fn delete_stable_label<'a>(
    &'a self,
    context_stable_ids: &'a ContextStableIds,
    annotator_name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Stats ─────────────────────────────────────────────────────────────

  fn stats(&self) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send + '_;
}
