//! Atomic archive metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    /// Sum scaled by 1000 to keep sub-millisecond precision.
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bucket_bounds: Vec<f64>) -> Self {
        let buckets = (0..=bucket_bounds.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            buckets,
            bucket_bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn default_latency() -> Self {
        Self::new(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0])
    }

    pub fn observe(&self, value: f64) {
        let index = self
            .bucket_bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bucket_bounds.len());
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum.load(Ordering::Relaxed) as f64 / 1000.0 / n as f64,
        }
    }
}

#[derive(Debug)]
pub struct ArchiveMetrics {
    pub documents_written: Counter,
    pub save_failures: Counter,
    pub autosave_ticks_skipped: Counter,
    pub decode_fallbacks: Counter,
    pub identity_conflicts: Counter,
    pub images_materialized: Counter,
    pub resolution_failures: Counter,
    pub save_latency_ms: Histogram,
}

impl ArchiveMetrics {
    pub fn new() -> Self {
        Self {
            documents_written: Counter::new(),
            save_failures: Counter::new(),
            autosave_ticks_skipped: Counter::new(),
            decode_fallbacks: Counter::new(),
            identity_conflicts: Counter::new(),
            images_materialized: Counter::new(),
            resolution_failures: Counter::new(),
            save_latency_ms: Histogram::default_latency(),
        }
    }

    pub fn record_save(&self, success: bool, latency_ms: f64) {
        self.save_latency_ms.observe(latency_ms);
        if success {
            self.documents_written.inc();
        } else {
            self.save_failures.inc();
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            documents_written: self.documents_written.get(),
            save_failures: self.save_failures.get(),
            autosave_ticks_skipped: self.autosave_ticks_skipped.get(),
            decode_fallbacks: self.decode_fallbacks.get(),
            identity_conflicts: self.identity_conflicts.get(),
            images_materialized: self.images_materialized.get(),
            resolution_failures: self.resolution_failures.get(),
            avg_save_latency_ms: self.save_latency_ms.mean(),
        }
    }
}

impl Default for ArchiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ArchiveMetrics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub documents_written: u64,
    pub save_failures: u64,
    pub autosave_ticks_skipped: u64,
    pub decode_fallbacks: u64,
    pub identity_conflicts: u64,
    pub images_materialized: u64,
    pub resolution_failures: u64,
    pub avg_save_latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new(vec![10.0, 100.0]);
        hist.observe(5.0);
        hist.observe(50.0);
        hist.observe(500.0);
        assert_eq!(hist.count(), 3);
        assert_eq!(hist.bucket_counts(), vec![1, 1, 1]);
        assert!((hist.mean() - 185.0).abs() < 1e-9);
    }

    #[test]
    fn test_archive_metrics_summary() {
        let metrics = ArchiveMetrics::new();
        metrics.record_save(true, 4.0);
        metrics.record_save(false, 2.0);
        metrics.autosave_ticks_skipped.inc();
        metrics.images_materialized.add(2);

        let summary = metrics.summary();
        assert_eq!(summary.documents_written, 1);
        assert_eq!(summary.save_failures, 1);
        assert_eq!(summary.autosave_ticks_skipped, 1);
        assert_eq!(summary.images_materialized, 2);
        assert!((summary.avg_save_latency_ms - 3.0).abs() < 1e-9);
    }
}
