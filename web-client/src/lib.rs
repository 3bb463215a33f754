pub mod fetcher;
pub mod metrics;

pub use fetcher::{validate_url, FetchMethod, FetcherConfig, HttpFetcher};
pub use metrics::{FetchMetrics, HostMetrics, MetricsCollector};
