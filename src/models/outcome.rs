//! Attempt outcome models
//!
//! Defines the normalized result of a single connection attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AdapterError;

/// Error key reported for every attempt that missed its deadline
pub const TIMEOUT_ERROR_KEY: &str = "Connection Timeout";

/// Attempt settlement status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failure,
    Timeout,
}

impl AttemptStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "✓",
            AttemptStatus::Failure => "✗",
            AttemptStatus::Timeout => "⏱",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Success => write!(f, "SUCCESS"),
            AttemptStatus::Failure => write!(f, "FAILURE"),
            AttemptStatus::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Stage at which an attempt failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Connect,
    Query,
}

impl FailureStage {
    pub fn name(&self) -> &'static str {
        match self {
            FailureStage::Connect => "connect",
            FailureStage::Query => "query",
        }
    }
}

/// Result payload of an attempt.
///
/// Latency exists only on success and an error key only on failure or
/// timeout, so the two can never be populated together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeKind {
    Success {
        latency_ms: f64,
    },
    Failure {
        stage: FailureStage,
        error_key: String,
    },
    Timeout,
}

/// Normalized result of one connection attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    /// Launch index within the batch
    pub index: usize,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

impl AttemptOutcome {
    pub fn success(index: usize, latency_ms: f64) -> Self {
        Self {
            index,
            kind: OutcomeKind::Success { latency_ms },
        }
    }

    pub fn failure(index: usize, stage: FailureStage, error_key: impl Into<String>) -> Self {
        Self {
            index,
            kind: OutcomeKind::Failure {
                stage,
                error_key: error_key.into(),
            },
        }
    }

    /// Build a failure from an adapter error, keyed by its native code or message
    pub fn from_adapter_error(index: usize, error: &AdapterError) -> Self {
        let stage = match error {
            AdapterError::Connect { .. } => FailureStage::Connect,
            AdapterError::Query { .. } => FailureStage::Query,
        };
        Self::failure(index, stage, error.error_key())
    }

    pub fn timeout(index: usize) -> Self {
        Self {
            index,
            kind: OutcomeKind::Timeout,
        }
    }

    pub fn status(&self) -> AttemptStatus {
        match self.kind {
            OutcomeKind::Success { .. } => AttemptStatus::Success,
            OutcomeKind::Failure { .. } => AttemptStatus::Failure,
            OutcomeKind::Timeout => AttemptStatus::Timeout,
        }
    }

    pub fn latency_ms(&self) -> Option<f64> {
        match self.kind {
            OutcomeKind::Success { latency_ms } => Some(latency_ms),
            _ => None,
        }
    }

    pub fn error_key(&self) -> Option<&str> {
        match &self.kind {
            OutcomeKind::Success { .. } => None,
            OutcomeKind::Failure { error_key, .. } => Some(error_key),
            OutcomeKind::Timeout => Some(TIMEOUT_ERROR_KEY),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempt #{}", self.status().symbol(), self.index)?;
        match &self.kind {
            OutcomeKind::Success { latency_ms } => write!(f, " [{latency_ms:.2}ms]"),
            OutcomeKind::Failure { stage, error_key } => {
                write!(f, " {} - {error_key}", stage.name())
            }
            OutcomeKind::Timeout => write!(f, " - {TIMEOUT_ERROR_KEY}"),
        }
    }
}
