//! External data provider seam.
//!
//! The server only needs two lookups: text -> coordinates, and
//! coordinates -> live reading. `TomTomProvider` is the production
//! implementation; tests plug in a mock.

use crate::models::{Coordinates, TrafficReading};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("location '{0}' not found")]
    NotFound(String),
    #[error("upstream timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("invalid upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Upstream(String),
}

impl ProviderError {
    /// NotFound est un échec de lookup, le reste est transitoire.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProviderError::NotFound(_))
    }
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn resolve_location(&self, text: &str) -> Result<Coordinates, ProviderError>;

    async fn fetch_reading(&self, coords: Coordinates) -> Result<TrafficReading, ProviderError>;
}

/// Borne un appel provider : à l'expiration on obtient `ProviderError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}
