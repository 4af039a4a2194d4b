//! Running performance averages for the hybrid searcher.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq)]
pub struct SearchStatsSnapshot {
    pub total_searches: u64,
    pub avg_total_time_seconds: f64,
    pub avg_fusion_time_seconds: f64,
}

/// Thread-safe accumulator; queries record their timings as they complete.
#[derive(Debug, Default)]
pub struct SearchStats {
    inner: Mutex<SearchStatsSnapshot>,
}

impl SearchStats {
    pub fn record(&self, total: Duration, fusion: Duration) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let n = inner.total_searches as f64;
        inner.avg_total_time_seconds =
            (inner.avg_total_time_seconds * n + total.as_secs_f64()) / (n + 1.0);
        inner.avg_fusion_time_seconds =
            (inner.avg_fusion_time_seconds * n + fusion.as_secs_f64()) / (n + 1.0);
        inner.total_searches += 1;
    }

    pub fn snapshot(&self) -> SearchStatsSnapshot {
        self.inner.lock().map(|inner| *inner).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_accumulate() {
        let stats = SearchStats::default();
        stats.record(Duration::from_millis(100), Duration::from_millis(10));
        stats.record(Duration::from_millis(300), Duration::from_millis(30));

        let snap = stats.snapshot();
        assert_eq!(snap.total_searches, 2);
        assert!((snap.avg_total_time_seconds - 0.2).abs() < 1e-9);
        assert!((snap.avg_fusion_time_seconds - 0.02).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_is_zeroed() {
        let stats = SearchStats::default();
        assert_eq!(stats.snapshot(), SearchStatsSnapshot::default());
    }
}
