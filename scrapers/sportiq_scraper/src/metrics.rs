use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScraperMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Fresh fixture lists held by the result cache when the snapshot was taken.
    #[serde(default)]
    pub cache_entries: usize,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Cheap to clone; every clone feeds the same counters.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<ScraperMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScraperMetrics> {
        // Counters stay meaningful even if a holder panicked.
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_request_start(&self) -> RequestTracker {
        RequestTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_rate_limit_wait(&self, duration: Duration) {
        self.lock().rate_limiter_wait_time_ms = duration.as_secs_f64() * 1000.0;
    }

    pub fn record_retry(&self) {
        self.lock().retries += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    pub fn record_error(&self, error: impl Into<String>) {
        let mut metrics = self.lock();
        metrics.last_error = Some(error.into());
        metrics.last_error_time = Some(Utc::now());
    }

    pub fn get_metrics(&self) -> ScraperMetrics {
        self.lock().clone()
    }
}

pub struct RequestTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, success: bool) {
        let duration = self.start_time.elapsed();
        let mut metrics = self.collector.lock();

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        // Exponential moving average, alpha = 0.1
        let alpha = 0.1;
        let sample = duration.as_secs_f64() * 1000.0;
        metrics.avg_response_time_ms = if metrics.total_requests == 1 {
            sample
        } else {
            metrics.avg_response_time_ms * (1.0 - alpha) + sample * alpha
        };
    }
}
