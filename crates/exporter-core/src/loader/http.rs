use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use super::{FetchError, PlaylistFetcher, PlaylistResponse, SegmentFetcher, SegmentResponse};
use crate::checker::MediaInfo;
use crate::config::HttpConfig;
use crate::media;

/// HTTP transport backed by one pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(Self::build_client(config)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn build_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
        let idle_per_host = if config.keep_alive {
            config.max_idle_conns
        } else {
            0
        };
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(config.user_agent.clone())
            .gzip(true);
        if !config.tls_verify {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build()
    }

    fn ensure_ok(url: &str, response: &Response) -> Result<(), FetchError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        Err(FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        Self::ensure_ok(url, &response)?;
        Ok(response)
    }

    async fn read_body(url: &str, response: Response) -> Result<Vec<u8>, FetchError> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| transport_error(url, e))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

// `Response::content_length` reports the decoded body size, which is zero for
// HEAD responses, so read the header itself.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl PlaylistFetcher for HttpFetcher {
    async fn fetch_playlist(&self, url: &str) -> Result<PlaylistResponse, FetchError> {
        let start = Instant::now();
        let response = self.get(url).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = Self::read_body(url, response).await?;
        debug!(url, bytes = body.len(), "Fetched playlist");

        Ok(PlaylistResponse {
            body,
            status,
            headers,
            duration: start.elapsed(),
        })
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    async fn fetch_segment(
        &self,
        url: &str,
        validate_content: bool,
    ) -> Result<SegmentResponse, FetchError> {
        let start = Instant::now();

        if !validate_content {
            let response = self
                .client
                .head(url)
                .send()
                .await
                .map_err(|e| transport_error(url, e))?;
            Self::ensure_ok(url, &response)?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();

            let size = match declared_length(&headers) {
                Some(len) => len,
                None => {
                    debug!(url, "HEAD response without Content-Length, falling back to GET");
                    let response = self.get(url).await?;
                    Self::read_body(url, response).await?.len() as u64
                }
            };

            return Ok(SegmentResponse {
                size,
                status,
                headers,
                duration: start.elapsed(),
                media_info: MediaInfo::default(),
            });
        }

        let response = self.get(url).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = Self::read_body(url, response).await?;
        let media_info = media::probe(&body).map_err(|e| FetchError::Probe {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(SegmentResponse {
            size: body.len() as u64,
            status,
            headers,
            duration: start.elapsed(),
            media_info,
        })
    }
}
