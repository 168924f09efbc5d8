//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:9090"
//! metrics_path = "/metrics"
//! log_format = "json"
//!
//! [checks]
//! workers = 8
//! retry_attempts = 2
//! retry_delay_ms = 500
//!
//! [http_client]
//! timeout_ms = 4000
//! user_agent = "hls_exporter/1.0"
//!
//! [[streams]]
//! name = "news"
//! url = "https://cdn.example.com/news/master.m3u8"
//! check_mode = "first_last"
//! interval_ms = 30000
//! timeout_ms = 10000
//! validate_content = true
//!
//! [streams.media_validation]
//! container_type = ["TS"]
//! min_segment_size = 10000
//! check_video = true
//! ```
//!
//! Any `HLS_*` environment variable listed in [`ENV_OVERRIDES`] replaces the
//! matching file value before validation.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use exporter_core::config::KNOWN_CONTAINERS;
use exporter_core::{CheckMode, CheckerConfig, HttpConfig, MediaValidation, StreamConfig};

/// Environment variables consulted by [`AppConfig::apply_env`].
pub const ENV_OVERRIDES: &[&str] = &[
    "HLS_SERVER_LISTEN",
    "HLS_SERVER_METRICS_PATH",
    "HLS_SERVER_HEALTH_PATH",
    "HLS_SERVER_LOG_FORMAT",
    "HLS_CHECKS_WORKERS",
    "HLS_CHECKS_RETRY_ATTEMPTS",
    "HLS_CHECKS_RETRY_DELAY_MS",
    "HLS_CHECKS_SEGMENT_SAMPLE",
    "HLS_HTTP_CLIENT_TIMEOUT_MS",
    "HLS_HTTP_CLIENT_USER_AGENT",
    "HLS_HTTP_CLIENT_TLS_VERIFY",
];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub checks: ChecksConfig,

    #[serde(default)]
    pub http_client: HttpClientConfig,

    #[serde(default)]
    pub streams: Vec<StreamDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_path: default_metrics_path(),
            health_path: default_health_path(),
            log_format: default_log_format(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".into()
}

fn default_health_path() -> String {
    "/health".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChecksConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_segment_sample")]
    pub segment_sample: usize,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            segment_sample: default_segment_sample(),
        }
    }
}

fn default_workers() -> usize {
    5
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_segment_sample() -> usize {
    3
}

impl ChecksConfig {
    pub fn to_checker_config(&self) -> CheckerConfig {
        CheckerConfig::default()
            .with_workers(self.workers)
            .with_retry(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
            .with_segment_sample(self.segment_sample)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_true")]
    pub keep_alive: bool,

    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: usize,

    #[serde(default = "default_true")]
    pub tls_verify: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            keep_alive: true,
            max_idle_conns: default_max_idle_conns(),
            tls_verify: true,
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_max_idle_conns() -> usize {
    10
}

fn default_user_agent() -> String {
    "hls_exporter/1.0".into()
}

impl HttpClientConfig {
    pub fn to_http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            keep_alive: self.keep_alive,
            max_idle_conns: self.max_idle_conns,
            tls_verify: self.tls_verify,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamDef {
    pub name: String,
    pub url: String,

    #[serde(default)]
    pub check_mode: CheckMode,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_stream_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub validate_content: bool,

    #[serde(default)]
    pub media_validation: Option<MediaValidation>,
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_stream_timeout_ms() -> u64 {
    10_000
}

impl StreamDef {
    pub fn to_stream_config(&self) -> StreamConfig {
        let mut stream = StreamConfig::new(&self.name, &self.url)
            .with_check_mode(self.check_mode)
            .with_interval(Duration::from_millis(self.interval_ms))
            .with_timeout(Duration::from_millis(self.timeout_ms));
        if self.validate_content {
            stream = stream.with_content_validation(self.media_validation.clone());
        } else {
            stream.media_validation = self.media_validation.clone();
        }
        stream
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("Invalid value '{}' for {}: {}", raw, key, e))
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `HLS_*` variables returned by `lookup` onto the parsed file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        for key in ENV_OVERRIDES {
            let Some(raw) = lookup(key) else {
                continue;
            };
            match *key {
                "HLS_SERVER_LISTEN" => self.server.listen = parse_env(key, &raw)?,
                "HLS_SERVER_METRICS_PATH" => self.server.metrics_path = raw,
                "HLS_SERVER_HEALTH_PATH" => self.server.health_path = raw,
                "HLS_SERVER_LOG_FORMAT" => self.server.log_format = raw,
                "HLS_CHECKS_WORKERS" => self.checks.workers = parse_env(key, &raw)?,
                "HLS_CHECKS_RETRY_ATTEMPTS" => self.checks.retry_attempts = parse_env(key, &raw)?,
                "HLS_CHECKS_RETRY_DELAY_MS" => self.checks.retry_delay_ms = parse_env(key, &raw)?,
                "HLS_CHECKS_SEGMENT_SAMPLE" => self.checks.segment_sample = parse_env(key, &raw)?,
                "HLS_HTTP_CLIENT_TIMEOUT_MS" => self.http_client.timeout_ms = parse_env(key, &raw)?,
                "HLS_HTTP_CLIENT_USER_AGENT" => self.http_client.user_agent = raw,
                "HLS_HTTP_CLIENT_TLS_VERIFY" => self.http_client.tls_verify = parse_env(key, &raw)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.listen.port() == 0 {
            return Err("server.listen must use a non-zero port".into());
        }
        for (field, path) in [
            ("metrics_path", &self.server.metrics_path),
            ("health_path", &self.server.health_path),
        ] {
            if !path.starts_with('/') {
                return Err(format!("server.{} must start with '/': {}", field, path));
            }
        }
        if self.server.metrics_path == self.server.health_path {
            return Err("server.metrics_path and server.health_path must differ".into());
        }
        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        if self.checks.workers == 0 {
            return Err("checks.workers must be greater than zero".into());
        }
        if self.checks.segment_sample == 0 {
            return Err("checks.segment_sample must be greater than zero".into());
        }
        if self.http_client.timeout_ms == 0 {
            return Err("http_client.timeout_ms must be greater than zero".into());
        }

        if self.streams.is_empty() {
            return Err("At least one stream must be configured".into());
        }
        let mut names = HashSet::new();
        for s in &self.streams {
            if s.name.trim().is_empty() {
                return Err("Stream name must not be empty".into());
            }
            if !names.insert(s.name.as_str()) {
                return Err(format!("Duplicate stream name: {}", s.name));
            }
            if s.url.trim().is_empty() {
                return Err(format!("Stream '{}' has an empty URL", s.name));
            }
            let parsed = url::Url::parse(&s.url)
                .map_err(|e| format!("Invalid URL for stream '{}': {} ({})", s.name, s.url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!(
                    "Stream URL must use http or https for stream '{}': {}",
                    s.name, s.url
                ));
            }
            if s.interval_ms == 0 || s.timeout_ms == 0 {
                return Err(format!(
                    "Stream '{}' needs a positive interval_ms and timeout_ms",
                    s.name
                ));
            }
            if s.timeout_ms >= s.interval_ms {
                return Err(format!(
                    "Stream '{}' timeout_ms ({}) must be less than interval_ms ({})",
                    s.name, s.timeout_ms, s.interval_ms
                ));
            }
            if s.validate_content {
                if let Some(policy) = &s.media_validation {
                    validate_policy(&s.name, policy)?;
                }
            }
        }

        Ok(())
    }
}

fn validate_policy(stream: &str, policy: &MediaValidation) -> Result<(), String> {
    if policy.container_type.is_empty() {
        return Err(format!(
            "Stream '{}' media_validation.container_type must not be empty",
            stream
        ));
    }
    for c in &policy.container_type {
        if !KNOWN_CONTAINERS.contains(&c.as_str()) {
            return Err(format!(
                "Stream '{}' has unknown container type '{}': expected one of {}",
                stream,
                c,
                KNOWN_CONTAINERS.join(", ")
            ));
        }
    }
    Ok(())
}
