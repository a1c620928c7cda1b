//! Concurrent batch orchestration
//!
//! Launches every attempt of a batch at once, waits for all of them to settle
//! and hands their outcomes to a single aggregator task over a channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::aggregator::Aggregator;
use super::attempt::AttemptRunner;
use super::memory::MemorySampler;
use crate::adapter::BackendAdapter;
use crate::error::HarnessError;
use crate::models::{AttemptOutcome, RunSummary};

/// Upper bound on buffered outcomes waiting for the aggregator
const MAX_CHANNEL_CAPACITY: usize = 1024;

/// Batch parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchParams {
    /// Number of attempts launched together
    pub total_attempts: usize,
    /// Deadline for each attempt
    pub per_attempt_timeout: Duration,
    /// Extra time an abandoned connect may take so it can still be closed
    pub drain_grace: Duration,
}

impl BatchParams {
    pub fn new(total_attempts: usize, per_attempt_timeout: Duration) -> Self {
        Self {
            total_attempts,
            per_attempt_timeout,
            drain_grace: Duration::from_secs(5),
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Reject parameters that cannot produce a meaningful batch
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.per_attempt_timeout.is_zero() {
            return Err(HarnessError::Config(
                "per-attempt timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs batches of attempts against one adapter
pub struct BatchOrchestrator<A: BackendAdapter> {
    adapter: Arc<A>,
    config: Arc<A::Config>,
}

impl<A: BackendAdapter> BatchOrchestrator<A> {
    pub fn new(adapter: A, config: A::Config) -> Self {
        Self::from_arc(Arc::new(adapter), Arc::new(config))
    }

    pub fn from_arc(adapter: Arc<A>, config: Arc<A::Config>) -> Self {
        Self { adapter, config }
    }

    /// Run one batch and return its summary.
    ///
    /// Every attempt is awaited regardless of how the others fare. The batch
    /// fails only on invalid parameters or an internal fault, never because
    /// of an attempt's failure.
    pub async fn run_batch(&self, params: &BatchParams) -> Result<RunSummary, HarnessError> {
        params.validate()?;

        let total = params.total_attempts;
        if total == 0 {
            info!("Batch requested zero attempts against {}", self.adapter.name());
            return Ok(RunSummary::empty());
        }

        info!(
            "Launching {} concurrent attempts against {} ({}ms timeout)",
            total,
            self.adapter.name(),
            params.per_attempt_timeout.as_millis()
        );

        let runner = AttemptRunner::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.config),
            params.per_attempt_timeout,
        )
        .with_drain_grace(params.drain_grace);

        let sampler = MemorySampler::start();
        let trigger = sampler.trigger();
        let capacity = total.min(MAX_CHANNEL_CAPACITY);
        let (tx, mut rx) = mpsc::channel::<AttemptOutcome>(capacity);
        let mut aggregator = Aggregator::new(total);
        let collector = tokio::spawn(async move {
            let mut settled = Vec::with_capacity(capacity);
            while rx.recv_many(&mut settled, capacity).await > 0 {
                // One sample request covers every completion in this drain.
                trigger.request();
                for outcome in settled.drain(..) {
                    aggregator.record_outcome(outcome);
                }
            }
            aggregator
        });

        let mut attempts = JoinSet::new();
        for index in 0..total {
            let runner = runner.clone();
            let tx = tx.clone();
            attempts.spawn(async move {
                let outcome = runner.run(index).await?;
                tx.send(outcome).await.map_err(|_| {
                    HarnessError::Internal(format!(
                        "aggregator stopped before attempt {index} was recorded"
                    ))
                })
            });
        }
        drop(tx);

        if let Err(fault) = join_all(&mut attempts).await {
            collector.abort();
            return Err(fault);
        }

        let peak_memory = tokio::task::spawn_blocking(move || sampler.stop())
            .await
            .map_err(|e| HarnessError::Internal(format!("memory sampler failed: {e}")))?;
        let mut aggregator = collector
            .await
            .map_err(|e| HarnessError::Internal(format!("aggregator task failed: {e}")))?;
        aggregator.record_peak_memory(peak_memory);
        let settled = aggregator.settled();
        let summary = aggregator.finish();

        if settled != total || !summary.is_consistent() {
            return Err(HarnessError::Internal(format!(
                "{settled} of {total} attempts accounted for"
            )));
        }

        info!(
            "Batch settled in {:.0}ms: {} succeeded, {} failed, avg latency {:.2}ms",
            summary.elapsed_ms,
            summary.successful,
            summary.failed,
            summary.average_latency_ms()
        );

        Ok(summary)
    }
}

/// Wait for every attempt task. On the first fault the remaining tasks are
/// aborted and the fault is returned.
async fn join_all(attempts: &mut JoinSet<Result<(), HarnessError>>) -> Result<(), HarnessError> {
    while let Some(joined) = attempts.join_next().await {
        let fault = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => HarnessError::Internal(format!("attempt task failed: {e}")),
        };
        warn!("Aborting batch: {}", fault);
        attempts.abort_all();
        return Err(fault);
    }
    Ok(())
}

/// Run a single batch against `adapter`
pub async fn run_batch<A: BackendAdapter>(
    adapter: A,
    config: A::Config,
    params: &BatchParams,
) -> Result<RunSummary, HarnessError> {
    BatchOrchestrator::new(adapter, config).run_batch(params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::models::TIMEOUT_ERROR_KEY;
    use crate::utils::Timer;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;
    use tokio_test::assert_err;

    /// Succeeds after a delay, failing connects whose sequence number is listed
    struct FixtureAdapter {
        delay: Duration,
        failing: HashSet<usize>,
        hang: bool,
        fail_close: bool,
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    impl FixtureAdapter {
        fn succeeding(delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                failing: HashSet::new(),
                hang: false,
                fail_close: false,
                calls: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, calls: &[usize]) -> Self {
            self.failing = calls.iter().copied().collect();
            self
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::succeeding(0)
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for FixtureAdapter {
        type Config = ();
        type Handle = ();

        fn name(&self) -> &str {
            "fixture"
        }

        async fn connect(&self, _config: &()) -> Result<(), AdapterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(&call) {
                return Err(AdapterError::connect("too many connections").with_code("1040"));
            }
            sleep(self.delay).await;
            Ok(())
        }

        async fn round_trip(&self, _handle: &mut ()) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn close(&self, _handle: ()) -> Result<(), AdapterError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(AdapterError::query("connection reset"));
            }
            Ok(())
        }
    }

    fn params(total: usize, timeout_ms: u64) -> BatchParams {
        BatchParams::new(total, Duration::from_millis(timeout_ms))
            .with_drain_grace(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let summary = run_batch(FixtureAdapter::succeeding(50), (), &params(10, 1000))
            .await
            .unwrap();

        assert_eq!(summary.successful, 10);
        assert_eq!(summary.failed, 0);
        assert!(summary.distinct_errors.is_empty());
        let avg = summary.average_latency_ms();
        assert!((50.0..150.0).contains(&avg), "avg latency {avg}");
        if cfg!(target_os = "linux") {
            assert!(summary.peak_memory_bytes > 0);
        }
    }

    #[tokio::test]
    async fn test_some_fail_with_one_key() {
        let adapter = FixtureAdapter::succeeding(10).failing_on(&[2, 5, 7]);
        let summary = run_batch(adapter, (), &params(10, 1000)).await.unwrap();

        assert_eq!(summary.successful, 7);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.distinct_errors, vec!["1040"]);
        assert_eq!(summary.error_breakdown.connect, 3);
        assert_eq!(summary.latencies.len(), 7);
    }

    #[tokio::test]
    async fn test_hanging_adapter_times_out_at_deadline() {
        let timer = Timer::start();
        let summary = run_batch(FixtureAdapter::hanging(), (), &params(5, 100))
            .await
            .unwrap();
        let elapsed = timer.elapsed_ms();

        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.error_breakdown.timeout, 5);
        assert_eq!(summary.distinct_errors, vec![TIMEOUT_ERROR_KEY]);
        assert!((100.0..600.0).contains(&elapsed), "elapsed {elapsed}");
        assert_eq!(summary.average_latency_ms(), 0.0);
    }

    #[tokio::test]
    async fn test_zero_attempts_is_empty() {
        let adapter = Arc::new(FixtureAdapter::succeeding(0));
        let orchestrator = BatchOrchestrator::from_arc(Arc::clone(&adapter), Arc::new(()));

        let summary = orchestrator.run_batch(&params(0, 100)).await.unwrap();
        assert_eq!(summary.total_requested, 0);
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 0);
        assert!(summary.distinct_errors.is_empty());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected_before_launch() {
        let adapter = Arc::new(FixtureAdapter::succeeding(0));
        let orchestrator = BatchOrchestrator::from_arc(Arc::clone(&adapter), Arc::new(()));

        let err = assert_err!(orchestrator.run_batch(&params(5, 0)).await);
        assert!(err.is_config());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_totals_always_add_up() {
        for total in [1, 3, 17, 64] {
            let adapter = FixtureAdapter::succeeding(1).failing_on(&[0, 2, 9, 40]);
            let summary = run_batch(adapter, (), &params(total, 1000)).await.unwrap();
            assert_eq!(summary.successful + summary.failed, total);
            assert!(summary.is_consistent());
        }
    }

    #[tokio::test]
    async fn test_mixed_outcomes_do_not_interfere() {
        struct Mixed;

        #[async_trait]
        impl BackendAdapter for Mixed {
            type Config = ();
            type Handle = usize;

            fn name(&self) -> &str {
                "mixed"
            }

            async fn connect(&self, _config: &()) -> Result<usize, AdapterError> {
                static NEXT: AtomicUsize = AtomicUsize::new(0);
                let n = NEXT.fetch_add(1, Ordering::SeqCst);
                match n % 3 {
                    0 => Ok(n),
                    1 => Err(AdapterError::connect("refused")),
                    _ => std::future::pending().await,
                }
            }

            async fn round_trip(&self, _handle: &mut usize) -> Result<(), AdapterError> {
                Ok(())
            }

            async fn close(&self, _handle: usize) -> Result<(), AdapterError> {
                Ok(())
            }
        }

        let summary = run_batch(Mixed, (), &params(9, 80)).await.unwrap();
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 6);
        assert_eq!(summary.error_breakdown.connect, 3);
        assert_eq!(summary.error_breakdown.timeout, 3);
        assert_eq!(summary.distinct_errors.len(), 2);
        assert_eq!(summary.latencies.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_wide_batch_settles_near_deadline() {
        let timer = Timer::start();
        let summary = run_batch(FixtureAdapter::hanging(), (), &params(2000, 100))
            .await
            .unwrap();
        let elapsed = timer.elapsed_ms();

        assert_eq!(summary.error_breakdown.timeout, 2000);
        assert!(elapsed < 1000.0, "elapsed {elapsed}");
    }

    #[tokio::test]
    async fn test_late_connect_with_failing_close_counts_once() {
        let adapter = Arc::new(FixtureAdapter {
            fail_close: true,
            ..FixtureAdapter::succeeding(150)
        });
        let orchestrator = BatchOrchestrator::from_arc(Arc::clone(&adapter), Arc::new(()));
        let params = BatchParams::new(6, Duration::from_millis(30))
            .with_drain_grace(Duration::from_millis(500));

        let summary = orchestrator.run_batch(&params).await.unwrap();
        assert_eq!(summary.failed, 6);
        assert_eq!(summary.error_breakdown.timeout, 6);
        assert_eq!(summary.successful, 0);
        assert!(summary.is_consistent());

        sleep(Duration::from_millis(400)).await;
        assert_eq!(adapter.closes.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_join_all_aborts_on_attempt_fault() {
        let mut attempts = JoinSet::new();
        attempts.spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        attempts.spawn(async {
            Err(HarnessError::Internal(
                "aggregator stopped before attempt 1 was recorded".to_string(),
            ))
        });

        let err = assert_err!(join_all(&mut attempts).await);
        assert!(matches!(err, HarnessError::Internal(_)));

        while let Some(joined) = attempts.join_next().await {
            assert!(joined.unwrap_err().is_cancelled());
        }
    }

    #[tokio::test]
    async fn test_join_all_reports_panicked_task() {
        async fn broken() -> Result<(), HarnessError> {
            panic!("harness bug")
        }

        let mut attempts = JoinSet::new();
        attempts.spawn(broken());

        let err = assert_err!(join_all(&mut attempts).await);
        assert!(matches!(err, HarnessError::Internal(_)));
    }

    #[tokio::test]
    async fn test_join_all_waits_for_every_task() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut attempts = JoinSet::new();
        for delay_ms in [30, 10, 20] {
            let done = Arc::clone(&done);
            attempts.spawn(async move {
                sleep(Duration::from_millis(delay_ms)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        join_all(&mut attempts).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }
}
