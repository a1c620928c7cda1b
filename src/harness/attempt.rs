//! Timed attempt runner
//!
//! Races one adapter connect/round-trip/close sequence against a deadline.
//! The adapter work runs in its own task under a cancellation token, so a
//! timed-out attempt is reported at once while its connection is still
//! released in the background.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapter::BackendAdapter;
use crate::error::{AdapterError, HarnessError};
use crate::models::{AttemptOutcome, FailureStage};
use crate::utils::Timer;

/// Error key for an adapter that panicked instead of returning an error
pub const ADAPTER_PANIC_KEY: &str = "adapter panicked";

const ABANDONED: &str = "attempt abandoned after deadline";

/// Runs single attempts against one adapter with a fixed deadline
pub struct AttemptRunner<A: BackendAdapter> {
    adapter: Arc<A>,
    config: Arc<A::Config>,
    deadline: Duration,
    drain_grace: Duration,
}

impl<A: BackendAdapter> Clone for AttemptRunner<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            config: Arc::clone(&self.config),
            deadline: self.deadline,
            drain_grace: self.drain_grace,
        }
    }
}

impl<A: BackendAdapter> AttemptRunner<A> {
    pub fn new(adapter: Arc<A>, config: Arc<A::Config>, deadline: Duration) -> Self {
        Self {
            adapter,
            config,
            deadline,
            drain_grace: Duration::ZERO,
        }
    }

    /// How long abandoned connects may still finish so their handle can be closed
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Run one attempt.
    ///
    /// Adapter errors and adapter panics become `Failure` outcomes. An error
    /// is returned only when the harness itself is broken.
    pub async fn run(&self, index: usize) -> Result<AttemptOutcome, HarnessError> {
        let token = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));
        let mut work = tokio::spawn(drive(
            Arc::clone(&self.adapter),
            Arc::clone(&self.config),
            token.clone(),
            Arc::clone(&connected),
            self.drain_grace,
            index,
        ));

        let outcome = tokio::select! {
            joined = &mut work => settle(index, joined, reached_stage(&connected))?,
            _ = sleep(self.deadline) => {
                token.cancel();
                debug!("Attempt {} exceeded {}ms deadline", index, self.deadline.as_millis());
                AttemptOutcome::timeout(index)
            }
        };

        debug!("{}", outcome);
        Ok(outcome)
    }
}

fn reached_stage(connected: &AtomicBool) -> FailureStage {
    if connected.load(Ordering::Acquire) {
        FailureStage::Query
    } else {
        FailureStage::Connect
    }
}

/// Turn the adapter task's result into an outcome. `stage` is where a panic
/// is charged.
fn settle(
    index: usize,
    joined: Result<Result<f64, AdapterError>, JoinError>,
    stage: FailureStage,
) -> Result<AttemptOutcome, HarnessError> {
    match joined {
        Ok(Ok(latency_ms)) => Ok(AttemptOutcome::success(index, latency_ms)),
        Ok(Err(e)) => Ok(AttemptOutcome::from_adapter_error(index, &e)),
        Err(e) if e.is_panic() => Ok(AttemptOutcome::failure(index, stage, ADAPTER_PANIC_KEY)),
        Err(e) => Err(HarnessError::Internal(format!(
            "adapter task for attempt {index} was cancelled: {e}"
        ))),
    }
}

/// Connect, round trip and close, returning the latency of the whole sequence.
///
/// `connected` is raised once a handle exists. Once `token` is cancelled
/// nobody reads the result; the task only makes sure a connection that was
/// or still gets opened is closed.
async fn drive<A: BackendAdapter>(
    adapter: Arc<A>,
    config: Arc<A::Config>,
    token: CancellationToken,
    connected: Arc<AtomicBool>,
    drain_grace: Duration,
    index: usize,
) -> Result<f64, AdapterError> {
    let timer = Timer::start();

    let mut connect = adapter.connect(&config);
    let opened = tokio::select! {
        result = &mut connect => result,
        _ = token.cancelled() => {
            match timeout(drain_grace, connect).await {
                Ok(Ok(handle)) => {
                    debug!("Attempt {} connected after its deadline; closing", index);
                    if let Err(e) = adapter.close(handle).await {
                        debug!("Attempt {}: close after deadline failed: {}", index, e);
                    }
                }
                Ok(Err(e)) => debug!("Attempt {} failed after its deadline: {}", index, e),
                Err(_) => debug!("Attempt {}: connect still pending after drain grace", index),
            }
            return Err(AdapterError::connect(ABANDONED));
        }
    };
    let mut handle = opened?;
    connected.store(true, Ordering::Release);

    let round_trip = tokio::select! {
        result = adapter.round_trip(&mut handle) => result,
        _ = token.cancelled() => Err(AdapterError::query(ABANDONED)),
    };

    if let Err(e) = adapter.close(handle).await {
        debug!("Attempt {}: close failed: {}", index, e);
    }

    let latency_ms = timer.elapsed_ms();
    if token.is_cancelled() {
        debug!(
            "Attempt {} settled after its deadline ({:.2}ms); result discarded",
            index, latency_ms
        );
    }

    round_trip.map(|()| latency_ms)
}
