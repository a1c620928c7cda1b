//! Results storage module
//!
//! Persists finished runs so they can be listed, inspected and exported later.

mod storage;

pub use storage::{EnvironmentInfo, ExportFormat, ResultsStorage, RunInfo, RunParams, StoredRun};
