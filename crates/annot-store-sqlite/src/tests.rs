//! Integration tests for `SqliteStore` against an in-memory database.

use annot_core::{
  annotation::{AnnotationKind, Feature, Label, NewAnnotation, Prediction},
  stable::{ContextStableIds, StableLabel},
  store::{AnnotationStore, StableLabelQuery},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn ids(s: &str) -> ContextStableIds { s.parse().expect("stable ids") }

/// A kind with no built-in table.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Marginal;

impl AnnotationKind for Marginal {
  const NAME: &'static str = "Marginal";
  const TABLE: &'static str = "marginal";
  const BACKREF: &'static str = "marginals";
  type Value = f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Clobber;

impl AnnotationKind for Clobber {
  const NAME: &'static str = "Clobber";
  const TABLE: &'static str = "candidate";
  const BACKREF: &'static str = "clobbers";
  type Value = i64;
}

// ─── Keys ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_key() {
  let s = store().await;

  let key = s.create_key("lf_spouse_between").await.unwrap();
  assert_eq!(key.name, "lf_spouse_between");

  let by_name = s.get_key("lf_spouse_between").await.unwrap().unwrap();
  assert_eq!(by_name, key);

  let by_id = s.get_key_by_id(key.id).await.unwrap().unwrap();
  assert_eq!(by_id, key);
}

#[tokio::test]
async fn get_key_missing_returns_none() {
  let s = store().await;
  assert!(s.get_key("nobody").await.unwrap().is_none());
  assert!(s.get_key_by_id(42).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_key_name_is_rejected() {
  let s = store().await;
  s.create_key("gold").await.unwrap();

  let err = s.create_key("gold").await.unwrap_err();
  assert!(matches!(err, Error::DuplicateKeyName(ref n) if n == "gold"));

  assert_eq!(s.list_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_or_create_key_is_idempotent() {
  let s = store().await;

  let first = s.get_or_create_key("gen_model").await.unwrap();
  let second = s.get_or_create_key("gen_model").await.unwrap();
  assert_eq!(first, second);

  let other = s.get_or_create_key("disc_model").await.unwrap();
  assert_ne!(other.id, first.id);
  assert_eq!(s.list_keys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn get_or_create_returns_key_made_by_create() {
  let s = store().await;
  let created = s.create_key("alice").await.unwrap();
  let fetched = s.get_or_create_key("alice").await.unwrap();
  assert_eq!(created, fetched);
}

#[tokio::test]
async fn list_keys_ordered_by_id() {
  let s = store().await;
  for name in ["c", "a", "b"] {
    s.create_key(name).await.unwrap();
  }

  let names: Vec<String> = s
    .list_keys()
    .await
    .unwrap()
    .into_iter()
    .map(|k| k.name)
    .collect();
  assert_eq!(names, ["c", "a", "b"]);
}

// ─── Annotations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_read_each_kind() {
  let s = store().await;
  let key = s.create_key("k").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  let label = s
    .insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, -1))
    .await
    .unwrap();
  assert_eq!(label.value, -1);
  assert_eq!(label.key, key);
  assert_eq!(label.to_string(), "Label (k = -1)");

  s.insert_annotation(NewAnnotation::<Feature>::new(key.id, cand.id, 2.5))
    .await
    .unwrap();
  s.insert_annotation(NewAnnotation::<Prediction>::new(key.id, cand.id, 0.875))
    .await
    .unwrap();

  let feature = s
    .get_annotation::<Feature>(key.id, cand.id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(feature.value, 2.5);

  let prediction = s
    .get_annotation::<Prediction>(key.id, cand.id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(prediction.value, 0.875);
}

#[tokio::test]
async fn whole_float_values_read_back_as_floats() {
  let s = store().await;
  let key = s.create_key("k").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  s.insert_annotation(NewAnnotation::<Feature>::new(key.id, cand.id, 1.0))
    .await
    .unwrap();

  let feature = s
    .get_annotation::<Feature>(key.id, cand.id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(feature.value, 1.0);
}

#[tokio::test]
async fn one_annotation_per_key_and_candidate() {
  let s = store().await;
  let key = s.create_key("alice").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  s.insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, 1))
    .await
    .unwrap();

  let err = s
    .insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, -1))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::DuplicateAnnotation { table: "label", key_id, candidate_id }
      if key_id == key.id && candidate_id == cand.id
  ));

  // The same pair in another table is a different annotation.
  s.insert_annotation(NewAnnotation::<Prediction>::new(key.id, cand.id, 0.5))
    .await
    .unwrap();
}

#[tokio::test]
async fn upsert_replaces_value() {
  let s = store().await;
  let key = s.create_key("alice").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  s.upsert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, 1))
    .await
    .unwrap();
  let updated = s
    .upsert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, -1))
    .await
    .unwrap();
  assert_eq!(updated.value, -1);

  let labels = s.annotations_for_candidate::<Label>(cand.id).await.unwrap();
  assert_eq!(labels.len(), 1);
  assert_eq!(labels[0].value, -1);
}

#[tokio::test]
async fn annotation_requires_existing_key_and_candidate() {
  let s = store().await;
  let key = s.create_key("k").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  let err = s
    .insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id + 100, 1))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::MissingReference { table: "label", .. }));

  let err = s
    .upsert_annotation(NewAnnotation::<Feature>::new(key.id + 100, cand.id, 1.0))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::MissingReference { table: "feature", .. }));
}

#[tokio::test]
async fn backrefs_list_by_candidate_and_key() {
  let s = store().await;
  let lf_a = s.create_key("lf_a").await.unwrap();
  let lf_b = s.create_key("lf_b").await.unwrap();
  let c1 = s.add_candidate(0).await.unwrap();
  let c2 = s.add_candidate(1).await.unwrap();

  for (key, cand, value) in [(&lf_b, &c1, 1), (&lf_a, &c1, -1), (&lf_a, &c2, 1)] {
    s.insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, value))
      .await
      .unwrap();
  }

  let c1_labels = s.annotations_for_candidate::<Label>(c1.id).await.unwrap();
  let c1_keys: Vec<&str> = c1_labels.iter().map(|l| l.key.name.as_str()).collect();
  assert_eq!(c1_keys, ["lf_a", "lf_b"]);

  let a_labels = s.annotations_for_key::<Label>(lf_a.id).await.unwrap();
  let a_cands: Vec<i64> = a_labels.iter().map(|l| l.candidate_id).collect();
  assert_eq!(a_cands, [c1.id, c2.id]);

  assert!(s.annotations_for_key::<Feature>(lf_a.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_annotation_removes_single_row() {
  let s = store().await;
  let key = s.create_key("k").await.unwrap();
  let c1 = s.add_candidate(0).await.unwrap();
  let c2 = s.add_candidate(0).await.unwrap();

  s.insert_annotation(NewAnnotation::<Prediction>::new(key.id, c1.id, 0.1))
    .await
    .unwrap();
  s.insert_annotation(NewAnnotation::<Prediction>::new(key.id, c2.id, 0.9))
    .await
    .unwrap();

  assert!(s.delete_annotation::<Prediction>(key.id, c1.id).await.unwrap());
  assert!(!s.delete_annotation::<Prediction>(key.id, c1.id).await.unwrap());

  let remaining = s.annotations_for_key::<Prediction>(key.id).await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].candidate_id, c2.id);
}

#[tokio::test]
async fn nan_value_is_a_null_value_error() {
  let s = store().await;
  let key = s.create_key("k").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  let err = s
    .insert_annotation(NewAnnotation::<Feature>::new(key.id, cand.id, f64::NAN))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::NullValue { table: "feature", key_id, candidate_id }
      if key_id == key.id && candidate_id == cand.id
  ));
  assert_eq!(s.stats().await.unwrap().features, 0);
}

// ─── Custom kinds ────────────────────────────────────────────────────────────

#[tokio::test]
async fn registered_kind_gets_its_own_table() {
  let s = store().await;
  let key = s.create_key("marginals_v1").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  // No table until the kind is registered.
  let err = s
    .insert_annotation(NewAnnotation::<Marginal>::new(key.id, cand.id, 0.25))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Database(_)));

  s.register_kind::<Marginal>().await.unwrap();
  s.register_kind::<Marginal>().await.unwrap();

  let marginal = s
    .insert_annotation(NewAnnotation::<Marginal>::new(key.id, cand.id, 0.25))
    .await
    .unwrap();
  assert_eq!(marginal.to_string(), "Marginal (marginals_v1 = 0.25)");

  let err = s
    .insert_annotation(NewAnnotation::<Marginal>::new(key.id, cand.id, 0.5))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateAnnotation { table: "marginal", .. }));

  // Built-in tables are untouched and the cascade rules carry over.
  assert!(s.annotations_for_candidate::<Feature>(cand.id).await.unwrap().is_empty());
  assert_eq!(s.annotations_for_key::<Marginal>(key.id).await.unwrap().len(), 1);
  assert!(s.delete_candidate(cand.id).await.unwrap());
  assert!(s.annotations_for_key::<Marginal>(key.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn kind_may_not_reuse_a_base_table() {
  let s = store().await;
  let err = s.register_kind::<Clobber>().await.unwrap_err();
  assert!(matches!(err, Error::InvalidKindTable("candidate")));
}

// ─── Cascades ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_candidate_cascades_to_annotations_not_stable_labels() {
  let s = store().await;
  let key = s.create_key("alice").await.unwrap();
  let doomed = s.add_candidate(0).await.unwrap();
  let kept = s.add_candidate(0).await.unwrap();

  for cand in [&doomed, &kept] {
    s.insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, 1))
      .await
      .unwrap();
    s.insert_annotation(NewAnnotation::<Feature>::new(key.id, cand.id, 3.0))
      .await
      .unwrap();
    s.insert_annotation(NewAnnotation::<Prediction>::new(key.id, cand.id, 0.7))
      .await
      .unwrap();
  }
  s.insert_stable_label(StableLabel::new(ids("doc1::span:0:5~~doc1::span:9:14"), "alice", 1))
    .await
    .unwrap();

  assert!(s.delete_candidate(doomed.id).await.unwrap());
  assert!(s.get_candidate(doomed.id).await.unwrap().is_none());

  assert!(s.annotations_for_candidate::<Label>(doomed.id).await.unwrap().is_empty());
  assert!(s.annotations_for_candidate::<Feature>(doomed.id).await.unwrap().is_empty());
  assert!(
    s.annotations_for_candidate::<Prediction>(doomed.id)
      .await
      .unwrap()
      .is_empty()
  );
  assert_eq!(s.annotations_for_candidate::<Label>(kept.id).await.unwrap().len(), 1);

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.candidates, 1);
  assert_eq!(stats.labels, 1);
  assert_eq!(stats.features, 1);
  assert_eq!(stats.predictions, 1);
  assert_eq!(stats.stable_labels, 1);
  assert_eq!(stats.keys, 1);
}

#[tokio::test]
async fn deleting_key_cascades_to_its_annotations_only() {
  let s = store().await;
  let lf = s.create_key("lf_doomed").await.unwrap();
  let gold = s.create_key("gold").await.unwrap();
  let cand = s.add_candidate(0).await.unwrap();

  s.insert_annotation(NewAnnotation::<Label>::new(lf.id, cand.id, 1))
    .await
    .unwrap();
  s.insert_annotation(NewAnnotation::<Feature>::new(lf.id, cand.id, 1.0))
    .await
    .unwrap();
  s.insert_annotation(NewAnnotation::<Label>::new(gold.id, cand.id, -1))
    .await
    .unwrap();

  assert!(s.delete_key("lf_doomed").await.unwrap());
  assert!(!s.delete_key("lf_doomed").await.unwrap());
  assert!(s.get_key("lf_doomed").await.unwrap().is_none());

  let labels = s.annotations_for_candidate::<Label>(cand.id).await.unwrap();
  assert_eq!(labels.len(), 1);
  assert_eq!(labels[0].key, gold);
  assert!(s.annotations_for_candidate::<Feature>(cand.id).await.unwrap().is_empty());

  // The candidate itself is not owned by the key.
  assert!(s.get_candidate(cand.id).await.unwrap().is_some());
}

#[tokio::test]
async fn deleting_missing_candidate_returns_false() {
  let s = store().await;
  assert!(!s.delete_candidate(7).await.unwrap());
}

// ─── Stable labels ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stable_label_without_any_candidate() {
  let s = store().await;
  let label = StableLabel::new(ids("news_12::span:40:52"), "bob", -1).with_split(2);

  s.insert_stable_label(label.clone()).await.unwrap();

  let fetched = s
    .get_stable_label(&label.context_stable_ids, "bob")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched, label);
  assert_eq!(s.stats().await.unwrap().candidates, 0);
}

#[tokio::test]
async fn duplicate_stable_label_is_rejected() {
  let s = store().await;
  let label = StableLabel::new(ids("d::s:0:1"), "bob", 1);
  s.insert_stable_label(label.clone()).await.unwrap();

  let err = s.insert_stable_label(label).await.unwrap_err();
  assert!(matches!(
    err,
    Error::DuplicateStableLabel { ref context_stable_ids, ref annotator_name }
      if context_stable_ids == "d::s:0:1" && annotator_name == "bob"
  ));

  // Another annotator may label the same contexts.
  s.insert_stable_label(StableLabel::new(ids("d::s:0:1"), "carol", -1))
    .await
    .unwrap();
}

#[tokio::test]
async fn upsert_stable_label_overwrites_split_and_value() {
  let s = store().await;
  s.upsert_stable_label(StableLabel::new(ids("d::s:0:1"), "bob", 1))
    .await
    .unwrap();
  s.upsert_stable_label(StableLabel::new(ids("d::s:0:1"), "bob", -1).with_split(1))
    .await
    .unwrap();

  let fetched = s
    .get_stable_label(&ids("d::s:0:1"), "bob")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.value, -1);
  assert_eq!(fetched.split, 1);
}

#[tokio::test]
async fn list_stable_labels_filters() {
  let s = store().await;
  for (ctx, who, split) in [("a::1", "bob", 0), ("a::2", "bob", 1), ("a::1", "carol", 1)] {
    s.insert_stable_label(StableLabel::new(ids(ctx), who, 1).with_split(split))
      .await
      .unwrap();
  }

  let all = s.list_stable_labels(&StableLabelQuery::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let bob = s
    .list_stable_labels(&StableLabelQuery {
      annotator_name: Some("bob".into()),
      split:          None,
    })
    .await
    .unwrap();
  assert_eq!(bob.len(), 2);
  assert!(bob.iter().all(|l| l.annotator_name == "bob"));

  let bob_dev = s
    .list_stable_labels(&StableLabelQuery {
      annotator_name: Some("bob".into()),
      split:          Some(1),
    })
    .await
    .unwrap();
  assert_eq!(bob_dev.len(), 1);
  assert_eq!(bob_dev[0].context_stable_ids, ids("a::2"));
}

#[tokio::test]
async fn delete_stable_label() {
  let s = store().await;
  let label = StableLabel::new(ids("x::y"), "bob", 1);
  s.insert_stable_label(label.clone()).await.unwrap();

  assert!(s.delete_stable_label(&label.context_stable_ids, "bob").await.unwrap());
  assert!(!s.delete_stable_label(&label.context_stable_ids, "bob").await.unwrap());
  assert!(
    s.get_stable_label(&label.context_stable_ids, "bob")
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn stable_ids_with_inner_tilde_read_back_unchanged() {
  let s = store().await;
  let ctx = ContextStableIds::new(["doc~1::span:0:4", "doc~1::span:9:12"]).unwrap();
  s.insert_stable_label(StableLabel::new(ctx.clone(), "bob", 1))
    .await
    .unwrap();

  let fetched = s.get_stable_label(&ctx, "bob").await.unwrap().unwrap();
  assert_eq!(fetched.context_stable_ids.ids(), ctx.ids());

  let listed = s.list_stable_labels(&StableLabelQuery::default()).await.unwrap();
  assert_eq!(listed[0].context_stable_ids, ctx);

  // A trailing or leading `~` would make the joined column ambiguous.
  assert!(ContextStableIds::new(["a~", "b"]).is_err());
  assert!(ContextStableIds::new(["a", "~b"]).is_err());
}

#[tokio::test]
async fn null_stable_label_split_reads_as_zero() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO stable_label (context_stable_ids, annotator_name, split, value)
         VALUES ('legacy::span:0:3', 'bob', NULL, -1)",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let fetched = s
    .get_stable_label(&ids("legacy::span:0:3"), "bob")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.split, 0);
  assert_eq!(fetched.value, -1);

  let train = s
    .list_stable_labels(&StableLabelQuery { annotator_name: None, split: Some(0) })
    .await
    .unwrap();
  assert_eq!(train, [fetched]);
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn reopen_file_store_keeps_rows() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("reopen.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    let key = s.create_key("gold").await.unwrap();
    let cand = s.add_candidate(0).await.unwrap();
    s.insert_annotation(NewAnnotation::<Label>::new(key.id, cand.id, 1))
      .await
      .unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let stats = s.stats().await.unwrap();
  assert_eq!(stats.keys, 1);
  assert_eq!(stats.labels, 1);

  // Foreign keys are switched on again for the new connection.
  let key = s.get_key("gold").await.unwrap().unwrap();
  assert!(s.delete_key("gold").await.unwrap());
  assert!(s.annotations_for_key::<Label>(key.id).await.unwrap().is_empty());
  assert_eq!(s.stats().await.unwrap().labels, 0);
}
