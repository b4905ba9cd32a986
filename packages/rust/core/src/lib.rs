//! Workflow orchestration for curator.
//!
//! This crate ties together extraction, classification, reconciliation and
//! the content store into one ingestion run:
//! - [`intake`]: flattening a batch of raw inputs into candidate URLs
//! - [`pipeline`]: the [`Workflow`] state machine

pub mod intake;
pub mod pipeline;

pub use intake::{Candidate, collect, harvest_urls};
pub use pipeline::{ProgressReporter, SilentProgress, Workflow};
