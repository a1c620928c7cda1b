//! Result aggregation
//!
//! Folds settled attempts into a [`RunSummary`]. The aggregator is owned by a
//! single task, so it needs no locking of its own.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::warn;

use crate::models::{
    AttemptOutcome, ErrorBreakdown, FailureStage, OutcomeKind, RunSummary, TIMEOUT_ERROR_KEY,
};
use crate::utils::Timer;

/// Accumulates outcomes for one batch
pub struct Aggregator {
    total_requested: usize,
    successful: usize,
    failed: usize,
    distinct_errors: Vec<String>,
    seen_errors: HashSet<String>,
    latencies: Vec<f64>,
    peak_memory_bytes: u64,
    breakdown: ErrorBreakdown,
    settled: Vec<bool>,
    started_at: DateTime<Utc>,
    timer: Timer,
}

impl Aggregator {
    /// Start an empty aggregate; the batch clock starts here
    pub fn new(total_requested: usize) -> Self {
        Self {
            total_requested,
            successful: 0,
            failed: 0,
            distinct_errors: Vec::new(),
            seen_errors: HashSet::new(),
            latencies: Vec::with_capacity(total_requested),
            peak_memory_bytes: 0,
            breakdown: ErrorBreakdown::default(),
            settled: vec![false; total_requested],
            started_at: Utc::now(),
            timer: Timer::start(),
        }
    }

    /// Fold a completed set of outcomes in the order given
    pub fn fold(
        total_requested: usize,
        outcomes: impl IntoIterator<Item = AttemptOutcome>,
    ) -> RunSummary {
        let mut aggregator = Self::new(total_requested);
        for outcome in outcomes {
            aggregator.record_outcome(outcome);
        }
        aggregator.finish()
    }

    /// Raise the recorded peak RSS; lower values are ignored
    pub fn record_peak_memory(&mut self, bytes: u64) {
        self.peak_memory_bytes = self.peak_memory_bytes.max(bytes);
    }

    /// Record an outcome. Returns false, leaving the aggregate untouched, for an
    /// index that is out of range or already settled.
    pub fn record_outcome(&mut self, outcome: AttemptOutcome) -> bool {
        match self.settled.get_mut(outcome.index) {
            Some(settled) if !*settled => *settled = true,
            _ => {
                warn!(
                    "Ignoring outcome for attempt {} (duplicate or out of range)",
                    outcome.index
                );
                return false;
            }
        }

        match outcome.kind {
            OutcomeKind::Success { latency_ms } => {
                self.successful += 1;
                self.latencies.push(latency_ms);
            }
            OutcomeKind::Failure { stage, error_key } => {
                self.failed += 1;
                match stage {
                    FailureStage::Connect => self.breakdown.connect += 1,
                    FailureStage::Query => self.breakdown.query += 1,
                }
                self.note_error(error_key);
            }
            OutcomeKind::Timeout => {
                self.failed += 1;
                self.breakdown.timeout += 1;
                self.note_error(TIMEOUT_ERROR_KEY.to_string());
            }
        }
        true
    }

    fn note_error(&mut self, key: String) {
        if self.seen_errors.insert(key.clone()) {
            self.distinct_errors.push(key);
        }
    }

    /// Attempts accounted for so far
    pub fn settled(&self) -> usize {
        self.successful + self.failed
    }

    /// Seal the aggregate; the end timestamp is taken now
    pub fn finish(self) -> RunSummary {
        RunSummary {
            total_requested: self.total_requested,
            successful: self.successful,
            failed: self.failed,
            distinct_errors: self.distinct_errors,
            latencies: self.latencies,
            peak_memory_bytes: self.peak_memory_bytes,
            error_breakdown: self.breakdown,
            started_at: self.started_at,
            ended_at: Utc::now(),
            elapsed_ms: self.timer.elapsed_ms(),
        }
    }
}
