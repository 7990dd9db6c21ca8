//! Round-trip latency of ladder page requests, reported on /health.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Page fetch latencies in milliseconds. The page source records, the API reads.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub sample_count: u64,
}

impl LatencyStats {
    /// 1ms to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        // Sub-millisecond responses land in the lowest bucket.
        let ms = (d.as_millis().min(600_000) as u64).max(1);
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.inner.lock() else {
            return LatencySummary::default();
        };
        if h.len() == 0 {
            return LatencySummary::default();
        }
        LatencySummary {
            p50_ms: Some(h.value_at_quantile(0.5)),
            p95_ms: Some(h.value_at_quantile(0.95)),
            p99_ms: Some(h.value_at_quantile(0.99)),
            sample_count: h.len(),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        assert_eq!(stats.summary(), LatencySummary::default());
    }

    #[test]
    fn records_and_clamps() {
        let stats = LatencyStats::new();
        stats.record(Duration::from_micros(10));
        stats.record(Duration::from_millis(120));
        stats.record(Duration::from_secs(3600));
        let summary = stats.summary();
        assert_eq!(summary.sample_count, 3);
        assert!(summary.p99_ms.unwrap() >= 599_000);
        let p50 = summary.p50_ms.unwrap();
        assert!((100..=130).contains(&p50), "p50 was {p50}");
    }
}
