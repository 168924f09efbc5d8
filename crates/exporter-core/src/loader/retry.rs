use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{FetchError, PlaylistFetcher, PlaylistResponse, SegmentFetcher, SegmentResponse};
use crate::config::CheckerConfig;

/// Decorates a fetcher with bounded retries and exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryFetcher<F> {
    inner: F,
    max_retries: u32,
    base_backoff: Duration,
}

impl<F> RetryFetcher<F> {
    pub fn new(inner: F, max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_backoff,
        }
    }

    pub fn from_config(inner: F, config: &CheckerConfig) -> Self {
        Self::new(inner, config.retry_attempts, config.retry_delay)
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    async fn run<T, Fut>(&self, url: &str, mut op: impl FnMut() -> Fut) -> Result<T, FetchError>
    where
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || attempt >= self.max_retries => return Err(err),
                Err(err) => {
                    attempt += 1;
                    let backoff = self.base_backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(url, attempt, error = %err, "Fetch failed, retrying");
                    debug!(url, backoff_ms = backoff.as_millis() as u64, "Backing off");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl<F: PlaylistFetcher> PlaylistFetcher for RetryFetcher<F> {
    async fn fetch_playlist(&self, url: &str) -> Result<PlaylistResponse, FetchError> {
        self.run(url, || self.inner.fetch_playlist(url)).await
    }
}

#[async_trait]
impl<F: SegmentFetcher> SegmentFetcher for RetryFetcher<F> {
    async fn fetch_segment(
        &self,
        url: &str,
        validate_content: bool,
    ) -> Result<SegmentResponse, FetchError> {
        self.run(url, || self.inner.fetch_segment(url, validate_content))
            .await
    }
}
