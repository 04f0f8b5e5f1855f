//! Network Fetch Port
//!
//! [`ImageFetcher`] is the only way the cache reaches the network.
//! [`HttpImageFetcher`] implements it over `reqwest` and classifies failures
//! into [`ImageError`] variants.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Error, ImageError, Result};

/// Fetch raw image bytes for a normalized URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, ImageError>;
}

/// HTTP(S) fetcher
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Build a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn classify(url: &str, err: reqwest::Error) -> ImageError {
        if err.is_timeout() {
            ImageError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_builder() {
            ImageError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            ImageError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Network {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response.bytes().await.map_err(|e| Self::classify(url, e))?;
        debug!(url, bytes = body.len(), "Fetched image");
        Ok(body)
    }
}

// =============================================================================
// Tests
// =============================================================================
