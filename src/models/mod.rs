//! Data models for connection attempts
//!
//! This module contains the per-attempt outcome and the batch summary.

mod outcome;
mod summary;

pub use outcome::{AttemptOutcome, AttemptStatus, FailureStage, OutcomeKind, TIMEOUT_ERROR_KEY};
pub use summary::{ErrorBreakdown, RunSummary, NO_ERROR};
