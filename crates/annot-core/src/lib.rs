//! Core types and trait definitions for the annotation store.
//!
//! Annotations attach a value (label, feature, prediction) to a candidate and
//! are keyed by the producer that emitted them. This crate has no database
//! dependency; storage backends implement [`store::AnnotationStore`].

pub mod annotation;
pub mod candidate;
pub mod error;
pub mod key;
pub mod stable;
pub mod store;

pub use error::{Error, Result};
