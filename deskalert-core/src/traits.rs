use crate::{AlertDefinition, CoreError, FetchError};
use async_trait::async_trait;

/// Read access to the current alert definitions.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Bulk read of every stored alert. Each call is a fresh snapshot.
    async fn list_all(&self) -> Result<Vec<AlertDefinition>, CoreError>;
}

/// Retrieves the body of a monitored page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
