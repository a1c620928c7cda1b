//! Batch run summary
//!
//! The aggregate produced once every attempt in a batch has settled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics::LatencyStats;

/// Reported as the primary error when no attempt failed
pub const NO_ERROR: &str = "None";

/// Failure counts by stage
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    /// Connection could not be established
    pub connect: usize,
    /// Connected but the round trip failed
    pub query: usize,
    /// Deadline elapsed first
    pub timeout: usize,
}

impl ErrorBreakdown {
    pub fn total(&self) -> usize {
        self.connect + self.query + self.timeout
    }
}

/// Aggregate of one full batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// Configured attempt count
    pub total_requested: usize,
    pub successful: usize,
    /// Failures and timeouts together
    pub failed: usize,
    /// Error keys in first-seen order, without duplicates
    pub distinct_errors: Vec<String>,
    /// Successful latencies in completion order
    pub latencies: Vec<f64>,
    pub peak_memory_bytes: u64,
    pub error_breakdown: ErrorBreakdown,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Monotonic wall time of the batch
    pub elapsed_ms: f64,
}

impl RunSummary {
    /// Summary of a batch with no attempts
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            total_requested: 0,
            successful: 0,
            failed: 0,
            distinct_errors: Vec::new(),
            latencies: Vec::new(),
            peak_memory_bytes: 0,
            error_breakdown: ErrorBreakdown::default(),
            started_at: now,
            ended_at: now,
            elapsed_ms: 0.0,
        }
    }

    /// Mean over successful attempts; zero when there were none
    pub fn average_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }

    /// First distinct error observed, or "None"
    pub fn primary_error(&self) -> &str {
        self.distinct_errors
            .first()
            .map(String::as_str)
            .unwrap_or(NO_ERROR)
    }

    pub fn latency_stats(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.latencies)
    }

    /// Success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requested == 0 {
            0.0
        } else {
            (self.successful as f64 / self.total_requested as f64) * 100.0
        }
    }

    /// Every requested attempt accounted for exactly once
    pub fn is_consistent(&self) -> bool {
        self.successful + self.failed == self.total_requested
            && self.latencies.len() == self.successful
            && self.error_breakdown.total() == self.failed
    }

    pub fn peak_memory_mib(&self) -> f64 {
        self.peak_memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Connection attempts: {}", self.total_requested)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Success: {} | Failed: {} (connect {}, query {}, timeout {})",
            self.successful,
            self.failed,
            self.error_breakdown.connect,
            self.error_breakdown.query,
            self.error_breakdown.timeout
        )?;
        writeln!(
            f,
            "Avg latency: {:.2}ms | Primary error: {}",
            self.average_latency_ms(),
            self.primary_error()
        )?;
        writeln!(
            f,
            "Peak memory: {:.1} MiB | Elapsed: {:.0}ms",
            self.peak_memory_mib(),
            self.elapsed_ms
        )
    }
}
