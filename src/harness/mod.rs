//! Connection-pool exhaustion harness
//!
//! Fans out timed connection attempts, collects every outcome and folds them
//! into one [`RunSummary`](crate::models::RunSummary).

mod aggregator;
mod attempt;
mod memory;
mod orchestrator;

pub use aggregator::Aggregator;
pub use attempt::{AttemptRunner, ADAPTER_PANIC_KEY};
pub use memory::{MemorySampler, SampleTrigger};
pub use orchestrator::{run_batch, BatchOrchestrator, BatchParams};
