//! Decision metrics

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Engine decision counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Total number of authorization checks, rejected requests included
    pub total_requests: u64,

    /// Number of permits
    pub permits: u64,

    /// Number of denials
    pub denials: u64,

    /// Requests rejected before evaluation
    pub invalid_requests: u64,

    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,

    /// Average latency over the retained samples
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Share of evaluated requests that were permitted
    pub fn permit_rate(&self) -> f64 {
        let total = self.permits + self.denials;
        if total == 0 {
            0.0
        } else {
            self.permits as f64 / total as f64
        }
    }
}

/// Collects decision counters and latency samples
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<VecDeque<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(VecDeque::with_capacity(max_samples))),
            max_samples,
        }
    }

    /// Record an evaluated decision
    pub async fn record_decision(&self, permitted: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;

        if permitted {
            metrics.permits += 1;
        } else {
            metrics.denials += 1;
        }
    }

    /// Record a request rejected before evaluation
    pub async fn record_invalid_request(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.invalid_requests += 1;
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let (avg, p50, p99) = {
            let mut samples = self.latency_samples.write().await;
            if samples.len() == self.max_samples {
                samples.pop_front();
            }
            samples.push_back(latency_ms);

            let sum: f64 = samples.iter().sum();
            let mut sorted: Vec<f64> = samples.iter().copied().collect();
            sorted.sort_unstable_by(|a, b| a.total_cmp(b));

            (
                sum / sorted.len() as f64,
                Self::percentile(&sorted, 0.50),
                Self::percentile(&sorted, 0.99),
            )
        };

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = avg;
        metrics.latency_p50_ms = p50;
        metrics.latency_p99_ms = p99;
    }

    /// Current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = EngineMetrics::default();

        let mut samples = self.latency_samples.write().await;
        samples.clear();
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_decision() {
        let collector = MetricsCollector::new();

        collector.record_decision(true).await;
        collector.record_decision(false).await;
        collector.record_decision(true).await;
        collector.record_invalid_request().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.permits, 2);
        assert_eq!(metrics.denials, 1);
        assert_eq!(metrics.invalid_requests, 1);
        assert!((metrics.permit_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(5)).await;
        collector.record_latency(Duration::from_millis(10)).await;
        collector.record_latency(Duration::from_millis(15)).await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p50_ms > 0.0);
        assert!(metrics.latency_p99_ms >= metrics.latency_p50_ms);
    }

    #[tokio::test]
    async fn test_sample_window() {
        let collector = MetricsCollector::with_capacity(2);

        collector.record_latency(Duration::from_millis(100)).await;
        collector.record_latency(Duration::from_millis(2)).await;
        collector.record_latency(Duration::from_millis(4)).await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 3.0).abs() < 0.5);
        assert_eq!(collector.latency_samples.read().await.len(), 2);

        // The window slides one sample at a time once full
        collector.record_latency(Duration::from_millis(6)).await;
        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 5.0).abs() < 0.5);
        assert_eq!(collector.latency_samples.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_decision(true).await;
        collector.reset().await;

        assert_eq!(collector.get_metrics().await, EngineMetrics::default());
    }
}
