use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of the build throughput of one shard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMetrics {
    /// Number of records indexed
    pub records_processed: u64,
    /// Number of malformed or too-short records skipped
    pub records_skipped: u64,
    /// Number of k-mer windows processed
    pub kmers_processed: u64,
    /// Number of residues in indexed sequences
    pub residues: u64,
    /// Number of k-mer entries rewritten
    pub kmer_updates: u64,
    /// Total processing time
    pub total_processing_time: Duration,
}

impl IndexMetrics {
    /// Calculate k-mers per second
    pub fn kmers_per_second(&self) -> f64 {
        if self.total_processing_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            self.kmers_processed as f64 / self.total_processing_time.as_secs_f64()
        }
    }

    /// Calculate records per second
    pub fn records_per_second(&self) -> f64 {
        if self.total_processing_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            self.records_processed as f64 / self.total_processing_time.as_secs_f64()
        }
    }
}

/// Thread-safe metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    records_processed: AtomicU64,
    records_skipped: AtomicU64,
    kmers_processed: AtomicU64,
    residues: AtomicU64,
    kmer_updates: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            records_processed: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            kmers_processed: AtomicU64::new(0),
            residues: AtomicU64::new(0),
            kmer_updates: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an indexed protein; returns the number of records indexed so far
    pub fn record_protein(&self, residues: u64, kmers: u64) -> u64 {
        self.residues.fetch_add(residues, Ordering::Relaxed);
        self.kmers_processed.fetch_add(kmers, Ordering::Relaxed);
        self.records_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kmer_update(&self) {
        self.kmer_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> IndexMetrics {
        IndexMetrics {
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            kmers_processed: self.kmers_processed.load(Ordering::Relaxed),
            residues: self.residues.load(Ordering::Relaxed),
            kmer_updates: self.kmer_updates.load(Ordering::Relaxed),
            total_processing_time: self.start_time.elapsed(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Performance timer for measuring operation durations
pub struct PerformanceTimer {
    start: Instant,
    operation: String,
}

impl PerformanceTimer {
    /// Start timing an operation
    pub fn start(operation: &str) -> Self {
        Self { start: Instant::now(), operation: operation.to_string() }
    }

    /// Finish timing and return the duration
    pub fn finish(self) -> Duration {
        self.start.elapsed()
    }

    /// Finish timing and log the result
    pub fn finish_and_log(self) -> Duration {
        let operation = self.operation.clone();
        let duration = self.finish();
        tracing::info!(operation = %operation, elapsed = ?duration, "operation finished");
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        assert_eq!(collector.record_protein(16, 10), 1);
        assert_eq!(collector.record_protein(8, 2), 2);
        collector.record_skipped();
        collector.record_kmer_update();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.records_processed, 2);
        assert_eq!(metrics.records_skipped, 1);
        assert_eq!(metrics.kmers_processed, 12);
        assert_eq!(metrics.residues, 24);
        assert_eq!(metrics.kmer_updates, 1);
    }

    #[test]
    fn test_performance_timer() {
        let timer = PerformanceTimer::start("test_operation");
        thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();

        assert!(duration >= Duration::from_millis(10));
    }
}
