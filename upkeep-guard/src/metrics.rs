//! Guard counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for guard outcomes since startup.
#[derive(Debug, Default)]
pub struct GuardMetrics {
    /// Checks that found an active record
    pub hits: AtomicU64,

    /// Checks that found nothing or an expired record
    pub misses: AtomicU64,

    /// Records accepted by the store
    pub recorded: AtomicU64,

    /// Records rejected because another caller won the insert
    pub conflicts: AtomicU64,

    /// Store calls that failed
    pub storage_failures: AtomicU64,
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> GuardMetricsSnapshot {
        GuardMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of guard metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub recorded: u64,
    pub conflicts: u64,
    pub storage_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = GuardMetrics::new();
        GuardMetrics::incr(&metrics.hits);
        GuardMetrics::incr(&metrics.hits);
        GuardMetrics::incr(&metrics.conflicts);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.conflicts, 1);
        assert_eq!(snapshot.misses, 0);
    }
}
