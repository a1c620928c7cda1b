//! Resident memory sampling
//!
//! Whole-process RSS, so the peak also reflects unrelated process activity.
//! Treat it as a diagnostic signal rather than a per-batch measurement.
//!
//! Sampling runs on its own OS thread so the `/proc` refresh never lands on
//! a runtime worker that an attempt is waiting for. The thread samples on a
//! fixed interval and again whenever a [`SampleTrigger`] fires.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::debug;

/// Default time between two samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks the peak RSS of the current process until stopped
pub struct MemorySampler {
    stop: Arc<AtomicBool>,
    peak: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl MemorySampler {
    pub fn start() -> Self {
        Self::with_interval(DEFAULT_SAMPLE_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let peak = Arc::new(AtomicU64::new(0));

        let thread = match sysinfo::get_current_pid() {
            Ok(pid) => {
                let stop = Arc::clone(&stop);
                let peak = Arc::clone(&peak);
                let spawned = thread::Builder::new()
                    .name("memory-sampler".to_string())
                    .spawn(move || sample_until_stopped(pid, interval, &stop, &peak));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        debug!("Memory sampler thread failed to start: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                debug!("Memory sampling unavailable: {}", e);
                None
            }
        };

        Self { stop, peak, thread }
    }

    /// Highest RSS in bytes seen so far, 0 when nothing was sampled
    pub fn peak_bytes(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Handle that asks for an extra sample without waiting for it
    pub fn trigger(&self) -> SampleTrigger {
        SampleTrigger {
            thread: self.thread.as_ref().map(|h| h.thread().clone()),
        }
    }

    /// Stop sampling and return the peak.
    ///
    /// Blocks until the sampler thread has taken its last sample, so call it
    /// from a blocking context.
    pub fn stop(mut self) -> u64 {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                debug!("Memory sampler thread panicked");
            }
        }
        self.peak_bytes()
    }
}

impl Drop for MemorySampler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = &self.thread {
            handle.thread().unpark();
        }
    }
}

/// Wakes the sampler thread for an immediate sample
#[derive(Clone, Debug)]
pub struct SampleTrigger {
    thread: Option<Thread>,
}

impl SampleTrigger {
    /// Never blocks; requests made while a sample is running coalesce
    pub fn request(&self) {
        if let Some(thread) = &self.thread {
            thread.unpark();
        }
    }
}

fn sample_until_stopped(pid: Pid, interval: Duration, stop: &AtomicBool, peak: &AtomicU64) {
    let refresh =
        RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory());
    let mut system = System::new_with_specifics(refresh);

    loop {
        if let Some(bytes) = rss_bytes(&mut system, pid) {
            peak.fetch_max(bytes, Ordering::Relaxed);
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }
        thread::park_timeout(interval);
    }
}

fn rss_bytes(system: &mut System, pid: Pid) -> Option<u64> {
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system.process(pid).map(|p| p.memory())
}
