//! The candidate envelope referenced by annotation tables.
//!
//! Candidates are owned by the wider framework; only the columns annotations
//! need are modelled here.

use serde::{Deserialize, Serialize};

pub type CandidateId = i64;

/// A data point under classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
  pub id:    CandidateId,
  /// Train/dev/test partition index.
  pub split: i64,
}
