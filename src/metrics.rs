use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-stage counters, shared between the stage thread and the runner
///
/// Each counter has a single writer: the stage that owns the metrics.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Work items produced, transformed or collected
    items: Arc<AtomicU64>,
    /// Feedback records put on the feedback channel
    feedback_sent: Arc<AtomicU64>,
    /// Feedback records taken off the feedback channel
    feedback_received: Arc<AtomicU64>,
    start_time: Instant,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            items: Arc::new(AtomicU64::new(0)),
            feedback_sent: Arc::new(AtomicU64::new(0)),
            feedback_received: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn record_item(&self) {
        self.items.fetch_add(1, Ordering::Release);
    }

    pub fn record_feedback_sent(&self) {
        self.feedback_sent.fetch_add(1, Ordering::Release);
    }

    pub fn record_feedback_received(&self, count: u64) {
        self.feedback_received.fetch_add(count, Ordering::Release);
    }

    pub fn total_items(&self) -> u64 {
        self.items.load(Ordering::Acquire)
    }

    pub fn total_feedback_sent(&self) -> u64 {
        self.feedback_sent.load(Ordering::Acquire)
    }

    pub fn total_feedback_received(&self) -> u64 {
        self.feedback_received.load(Ordering::Acquire)
    }

    /// Items per second since the metrics were created
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_items() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items: self.total_items(),
            feedback_sent: self.total_feedback_sent(),
            feedback_received: self.total_feedback_received(),
            throughput_ips: self.throughput_ips(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of a stage's metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub items: u64,
    pub feedback_sent: u64,
    pub feedback_received: u64,
    pub throughput_ips: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Items: {}, Feedback sent: {}, Feedback received: {}, \
             Throughput: {:.2} items/s, Elapsed: {:.3}s",
            self.items,
            self.feedback_sent,
            self.feedback_received,
            self.throughput_ips,
            self.elapsed.as_secs_f64()
        )
    }
}
