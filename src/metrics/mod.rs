//! Performance metrics
//!
//! Latency percentiles and spread over successful attempts.

mod latency;

pub use latency::{percentile, LatencyStats, Percentiles};
