//! Shared health state for the /health endpoint.
//! Updated by the session routes as operations finish.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::api::latency::LatencySummary;
use crate::tracker::now_secs;

/// Operation counters. Written by the route handlers, read by /health.
#[derive(Default)]
pub struct HealthState {
    /// Unix seconds at startup.
    pub started_at: AtomicU64,
    pub operations: AtomicU64,
    /// Operations that ended in a network failure.
    pub failures: AtomicU64,
    /// Unix seconds of the last failure (0 = none).
    pub last_failure_at: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub page_fetches: u64,
    pub operations: u64,
    pub failures: u64,
    pub last_failure_at: Option<u64>,
    pub fetch_latency: LatencySummary,
}

impl HealthState {
    pub fn new() -> Self {
        let state = Self::default();
        state.started_at.store(now_secs() as u64, Ordering::Relaxed);
        state
    }

    pub fn record_operation(&self, failed: bool) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
            self.last_failure_at.store(now_secs() as u64, Ordering::Relaxed);
        }
    }

    pub fn report(&self, sessions: usize, page_fetches: u64, fetch_latency: LatencySummary) -> HealthReport {
        let last_failure_at = self.last_failure_at.load(Ordering::Relaxed);
        HealthReport {
            status: "ok",
            uptime_secs: (now_secs() as u64).saturating_sub(self.started_at.load(Ordering::Relaxed)),
            sessions,
            page_fetches,
            operations: self.operations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_failure_at: (last_failure_at > 0).then_some(last_failure_at),
            fetch_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_operations_and_failures() {
        let health = HealthState::new();
        health.record_operation(false);
        health.record_operation(true);
        let report = health.report(2, 9, LatencySummary::default());
        assert_eq!(report.operations, 2);
        assert_eq!(report.failures, 1);
        assert!(report.last_failure_at.is_some());
        assert_eq!(report.sessions, 2);
    }
}
