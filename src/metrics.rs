use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::model::{LookupResult, NetworkErrorKind};

/// Lookup counters shared between the dispatcher and its tasks.
#[derive(Clone, Debug)]
pub struct LookupMetrics {
    total_dispatched: Arc<AtomicU64>,
    total_succeeded: Arc<AtomicU64>,
    total_invalid: Arc<AtomicU64>,
    total_failed: Arc<AtomicU64>,
    total_timeouts: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl LookupMetrics {
    pub fn new() -> Self {
        LookupMetrics {
            total_dispatched: Arc::new(AtomicU64::new(0)),
            total_succeeded: Arc::new(AtomicU64::new(0)),
            total_invalid: Arc::new(AtomicU64::new(0)),
            total_failed: Arc::new(AtomicU64::new(0)),
            total_timeouts: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }

    pub fn increment_dispatched(&self) {
        self.total_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a terminal result.
    pub fn record(&self, result: &LookupResult) {
        match result {
            LookupResult::Success(_) => {
                self.total_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            LookupResult::ValidationError { .. } => {
                self.total_invalid.fetch_add(1, Ordering::Relaxed);
            }
            LookupResult::NetworkError { kind, .. } => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                if *kind == NetworkErrorKind::Timeout {
                    self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn get_dispatched(&self) -> u64 {
        self.total_dispatched.load(Ordering::Relaxed)
    }

    pub fn get_succeeded(&self) -> u64 {
        self.total_succeeded.load(Ordering::Relaxed)
    }

    pub fn get_invalid(&self) -> u64 {
        self.total_invalid.load(Ordering::Relaxed)
    }

    pub fn get_failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    pub fn get_timeouts(&self) -> u64 {
        self.total_timeouts.load(Ordering::Relaxed)
    }

    /// Results produced so far, of any kind.
    pub fn get_completed(&self) -> u64 {
        self.get_succeeded() + self.get_invalid() + self.get_failed()
    }

    pub fn get_success_rate(&self) -> f64 {
        let completed = self.get_completed();
        if completed > 0 {
            self.get_succeeded() as f64 / completed as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        tracing::info!("=== Lookup Summary ===");
        tracing::info!("  Dispatched: {}", self.get_dispatched());
        tracing::info!("  Succeeded: {}", self.get_succeeded());
        tracing::info!("  Invalid input: {}", self.get_invalid());
        tracing::info!("  Failed: {} ({} timeouts)", self.get_failed(), self.get_timeouts());
        tracing::info!("  Success rate: {:.2}%", self.get_success_rate());
        tracing::info!("  Session time: {:.2}s", self.start_time.elapsed().as_secs_f64());
    }
}

impl Default for LookupMetrics {
    fn default() -> Self {
        Self::new()
    }
}
