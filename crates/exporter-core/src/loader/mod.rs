mod http;
mod retry;

pub use http::HttpFetcher;
pub use retry::RetryFetcher;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::checker::MediaInfo;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
    #[error("Cannot analyze media of {url}: {reason}")]
    Probe { url: String, reason: String },
    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Client errors (other than 429) and undecodable media never succeed on
    /// a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => !((400..500).contains(status) && *status != 429),
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Probe { .. } | Self::Cancelled { .. } => false,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Http { url, .. }
            | Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::Probe { url, .. }
            | Self::Cancelled { url } => url,
        }
    }
}

/// A successfully downloaded playlist.
#[derive(Debug, Clone)]
pub struct PlaylistResponse {
    pub body: Vec<u8>,
    pub status: u16,
    pub headers: HeaderMap,
    pub duration: Duration,
}

/// Result of a segment probe. `media_info` is only populated when the body
/// was downloaded.
#[derive(Debug, Clone)]
pub struct SegmentResponse {
    pub size: u64,
    pub status: u16,
    pub headers: HeaderMap,
    pub duration: Duration,
    pub media_info: MediaInfo,
}

/// Fetches playlist documents. Implementations must fail on any status other
/// than 200 and be safe to share across tasks.
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    async fn fetch_playlist(&self, url: &str) -> Result<PlaylistResponse, FetchError>;
}

/// Fetches media segments. With `validate_content == false` only transport
/// metadata is requested; otherwise the body is downloaded and probed.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn fetch_segment(
        &self,
        url: &str,
        validate_content: bool,
    ) -> Result<SegmentResponse, FetchError>;
}
