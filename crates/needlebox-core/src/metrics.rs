//! Process-wide counters.
//!
//! Incremented silently at the call site; [`Metrics::flush`] emits them as a
//! single `info!` event, typically at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

use needlebox_sandbox::ExecutionStatus;

pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    episodes_run: AtomicU64,
    turns_executed: AtomicU64,
    capability_violations: AtomicU64,
    timeouts: AtomicU64,
    runtime_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            episodes_run: AtomicU64::new(0),
            turns_executed: AtomicU64::new(0),
            capability_violations: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            runtime_errors: AtomicU64::new(0),
        }
    }

    pub fn inc_episodes(&self) {
        self.episodes_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "episodes_run", "counter incremented");
    }

    /// Count a turn and bucket it by status.
    pub fn record_turn(&self, status: ExecutionStatus) {
        self.turns_executed.fetch_add(1, Ordering::Relaxed);
        let bucket = match status {
            ExecutionStatus::Ok => return,
            ExecutionStatus::CapabilityViolation => &self.capability_violations,
            ExecutionStatus::Timeout => &self.timeouts,
            ExecutionStatus::RuntimeError => &self.runtime_errors,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = %status, "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            episodes_run = self.episodes_run(),
            turns_executed = self.turns_executed(),
            capability_violations = self.capability_violations(),
            timeouts = self.timeouts(),
            runtime_errors = self.runtime_errors(),
        );
    }

    pub fn episodes_run(&self) -> u64 {
        self.episodes_run.load(Ordering::Relaxed)
    }

    pub fn turns_executed(&self) -> u64 {
        self.turns_executed.load(Ordering::Relaxed)
    }

    pub fn capability_violations(&self) -> u64 {
        self.capability_violations.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn runtime_errors(&self) -> u64 {
        self.runtime_errors.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.episodes_run.store(0, Ordering::Relaxed);
        self.turns_executed.store(0, Ordering::Relaxed);
        self.capability_violations.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.runtime_errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_bucket_by_status() {
        let m = Metrics::new();
        m.record_turn(ExecutionStatus::Ok);
        m.record_turn(ExecutionStatus::CapabilityViolation);
        m.record_turn(ExecutionStatus::Timeout);
        m.record_turn(ExecutionStatus::Timeout);
        m.record_turn(ExecutionStatus::RuntimeError);
        assert_eq!(m.turns_executed(), 5);
        assert_eq!(m.capability_violations(), 1);
        assert_eq!(m.timeouts(), 2);
        assert_eq!(m.runtime_errors(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_episodes();
        m.record_turn(ExecutionStatus::RuntimeError);
        m.reset();
        assert_eq!(m.episodes_run(), 0);
        assert_eq!(m.turns_executed(), 0);
        assert_eq!(m.runtime_errors(), 0);
    }
}
