//! Thumbnail retrieval for analysed media

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::core::models::{AppError, AppResult};

/// Browser-like agent, some CDNs refuse bare clients
pub const DEFAULT_THUMBNAIL_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Downloads thumbnail image bytes
#[async_trait]
pub trait ThumbnailFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AppResult<Bytes>;
}

/// reqwest-backed fetcher
pub struct HttpThumbnailFetcher {
    client: Client,
}

impl HttpThumbnailFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ThumbnailFetcher for HttpThumbnailFetcher {
    async fn fetch(&self, url: &str) -> AppResult<Bytes> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Runtime(format!(
                "Thumbnail request returned {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        debug!("Fetched thumbnail ({} bytes) from {}", bytes.len(), url);
        Ok(bytes)
    }
}

/// Fetcher that never returns an image
pub struct NoThumbnails;

#[async_trait]
impl ThumbnailFetcher for NoThumbnails {
    async fn fetch(&self, _url: &str) -> AppResult<Bytes> {
        Err(AppError::Runtime("thumbnail fetching disabled".to_string()))
    }
}
