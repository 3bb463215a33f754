use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub average_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_host: HashMap<String, HostMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub max_response_time: Duration,
    pub last_status_code: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub host: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub timed_out: bool,
}

impl HostMetrics {
    fn new() -> Self {
        Self {
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_response_time: Duration::ZERO,
            max_response_time: Duration::ZERO,
            last_status_code: None,
        }
    }

    fn update(&mut self, metrics: &RequestMetrics) {
        self.request_count += 1;
        self.total_response_time += metrics.response_time;
        self.max_response_time = self.max_response_time.max(metrics.response_time);
        self.last_status_code = metrics.status_code.or(self.last_status_code);

        if metrics.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.request_count == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.request_count as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.request_count as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<FetchMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, request: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        let previous_total = metrics.total_requests;
        metrics.total_requests += 1;
        if request.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if request.timed_out {
            metrics.timed_out_requests += 1;
        }

        // Running mean over all requests
        let total_time =
            metrics.average_response_time * previous_total as u32 + request.response_time;
        metrics.average_response_time = total_time / metrics.total_requests as u32;
        metrics.last_request_time = Some(SystemTime::now());

        metrics
            .requests_by_host
            .entry(request.host.clone())
            .or_insert_with(HostMetrics::new)
            .update(&request);
    }

    pub async fn snapshot(&self) -> FetchMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = FetchMetrics::default();
    }
}
