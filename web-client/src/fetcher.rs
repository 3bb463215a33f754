use crate::metrics::{FetchMetrics, MetricsCollector, RequestMetrics};
use async_trait::async_trait;
use deskalert_core::{ConfigError, ContentFetcher, CoreError, FetchError, FetcherSettings};
use reqwest::{Client, Method};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    Post,
}

impl FetchMethod {
    fn as_reqwest(self) -> Method {
        match self {
            FetchMethod::Get => Method::GET,
            FetchMethod::Post => Method::POST,
        }
    }
}

impl FromStr for FetchMethod {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Ok(FetchMethod::Get),
            "POST" => Ok(FetchMethod::Post),
            _ => Err(ConfigError::InvalidValue {
                field: "fetcher.method".to_string(),
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub method: FetchMethod,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("deskalert/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            method: FetchMethod::Get,
        }
    }
}

impl TryFrom<&FetcherSettings> for FetcherConfig {
    type Error = ConfigError;

    fn try_from(settings: &FetcherSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            user_agent: settings.user_agent.clone(),
            timeout: settings.timeout(),
            method: settings.method.parse()?,
        })
    }
}

/// Fetches page bodies over HTTP with one pooled client.
#[derive(Debug)]
pub struct HttpFetcher {
    http_client: Client,
    config: FetcherConfig,
    metrics: Arc<MetricsCollector>,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn from_settings(settings: &FetcherSettings) -> Result<Self, CoreError> {
        Self::new(FetcherConfig::try_from(settings)?)
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub async fn metrics(&self) -> FetchMetrics {
        self.metrics.snapshot().await
    }

    fn map_send_error(&self, url: &Url, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::timed_out(self.config.timeout)
        } else {
            warn!("Network error for {}: {}", url, error);
            FetchError::Network {
                reason: error.to_string(),
            }
        }
    }

    async fn execute(&self, url: &Url) -> Result<(String, u16), FetchError> {
        let response = self
            .http_client
            .request(self.config.method.as_reqwest(), url.clone())
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status_code: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timed_out(self.config.timeout)
            } else {
                FetchError::Body {
                    reason: e.to_string(),
                }
            }
        })?;

        Ok((body, status.as_u16()))
    }
}

/// Only absolute http(s) addresses can be monitored.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = validate_url(url)?;
        let host = url.host_str().unwrap_or_default().to_string();
        let start_time = Instant::now();

        debug!("Fetching {} {}", self.config.method.as_reqwest(), url);
        let result = self.execute(&url).await;

        let status_code = match &result {
            Ok((_, status)) => Some(*status),
            Err(FetchError::HttpStatus { status_code }) => Some(*status_code),
            Err(_) => None,
        };
        self.metrics
            .record_request(RequestMetrics {
                host,
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                timed_out: matches!(result, Err(FetchError::Timeout { .. })),
            })
            .await;

        result.map(|(body, _)| body)
    }
}
