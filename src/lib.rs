//! Database connection-pool exhaustion harness
//!
//! Opens a large number of concurrent connections against one database,
//! classifies how each attempt settles (success, failure, timeout) and folds
//! the outcomes into a single [`RunSummary`](models::RunSummary).
//!
//! The database specifics live behind [`BackendAdapter`](adapter::BackendAdapter);
//! [`harness`] only orchestrates, times and aggregates.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod models;
pub mod output;
pub mod results;
pub mod utils;
