//! Store metrics and observability.
//!
//! Counters for writes, staleness propagation and merge outcomes. Each store
//! owns its own counters (clones of a store share them).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Entries inserted by create or merge
    entries_created: AtomicU64,

    /// Entries whose text was overwritten by update, update_and_lock or merge
    entries_updated: AtomicU64,

    /// Rows removed by delete, including cascaded family members
    entries_deleted: AtomicU64,

    /// Default-locale writes that triggered propagation
    propagations: AtomicU64,

    /// Sibling rows flagged as needing review by propagation
    rows_flagged: AtomicU64,

    /// Default-locale deletes that cascaded to a whole family
    cascades: AtomicU64,

    /// Merge items skipped because the entry was locked
    merge_skipped_locked: AtomicU64,

    /// Merge items that failed with a storage error
    merge_failures: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&self) {
        self.entries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updated(&self) {
        self.entries_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, rows: u64) {
        self.entries_deleted.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record one propagation event and the number of siblings it flagged
    pub fn record_propagation(&self, flagged: u64) {
        self.propagations.fetch_add(1, Ordering::Relaxed);
        self.rows_flagged.fetch_add(flagged, Ordering::Relaxed);
    }

    pub fn record_cascade(&self) {
        self.cascades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_skip(&self) {
        self.merge_skipped_locked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_failure(&self) {
        self.merge_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            entries_created: self.entries_created.load(Ordering::Relaxed),
            entries_updated: self.entries_updated.load(Ordering::Relaxed),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
            propagations: self.propagations.load(Ordering::Relaxed),
            rows_flagged: self.rows_flagged.load(Ordering::Relaxed),
            cascades: self.cascades.load(Ordering::Relaxed),
            merge_skipped_locked: self.merge_skipped_locked.load(Ordering::Relaxed),
            merge_failures: self.merge_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`StoreMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    pub entries_created: u64,
    pub entries_updated: u64,
    pub entries_deleted: u64,
    pub propagations: u64,
    pub rows_flagged: u64,
    pub cascades: u64,
    pub merge_skipped_locked: u64,
    pub merge_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(StoreMetrics::new().report(), MetricsReport::default());
    }

    #[test]
    fn test_propagation_counts_rows() {
        let metrics = StoreMetrics::new();
        metrics.record_propagation(3);
        metrics.record_propagation(0);

        let report = metrics.report();
        assert_eq!(report.propagations, 2);
        assert_eq!(report.rows_flagged, 3);
    }

    #[test]
    fn test_counters_are_independent() {
        let metrics = StoreMetrics::new();
        metrics.record_created();
        metrics.record_created();
        metrics.record_updated();
        metrics.record_deleted(4);
        metrics.record_cascade();
        metrics.record_merge_skip();
        metrics.record_merge_failure();

        let report = metrics.report();
        assert_eq!(report.entries_created, 2);
        assert_eq!(report.entries_updated, 1);
        assert_eq!(report.entries_deleted, 4);
        assert_eq!(report.cascades, 1);
        assert_eq!(report.merge_skipped_locked, 1);
        assert_eq!(report.merge_failures, 1);
    }

    #[test]
    fn test_report_serializes() {
        let metrics = StoreMetrics::new();
        metrics.record_created();
        let json = serde_json::to_value(metrics.report()).expect("serialize");
        assert_eq!(json["entries_created"], 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = std::sync::Arc::new(StoreMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_updated();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }
        assert_eq!(metrics.report().entries_updated, 800);
    }
}
