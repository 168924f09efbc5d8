use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Container identifiers accepted in a [`MediaValidation`] allow-list.
pub const KNOWN_CONTAINERS: &[&str] = &["TS", "fMP4"];

/// Which segments of each variant are fetched during a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    #[default]
    All,
    FirstLast,
    Random,
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::FirstLast => write!(f, "first_last"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl FromStr for CheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "first_last" => Ok(Self::FirstLast),
            "random" => Ok(Self::Random),
            other => Err(format!(
                "invalid check mode '{}': must be 'all', 'first_last' or 'random'",
                other
            )),
        }
    }
}

/// Content policy applied to downloaded segments when a stream enables
/// content validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaValidation {
    /// Allowed container identifiers (e.g. `"TS"`, `"fMP4"`).
    pub container_type: Vec<String>,
    /// Minimum acceptable segment size in bytes.
    #[serde(default)]
    pub min_segment_size: u64,
    /// Require an audio track. fMP4 media fragments carry no track
    /// information, so this only passes for TS or init segments.
    #[serde(default)]
    pub check_audio: bool,
    /// Require a video track. Same fMP4 caveat as `check_audio`.
    #[serde(default)]
    pub check_video: bool,
}

impl MediaValidation {
    pub fn allows_container(&self, container: &str) -> bool {
        self.container_type.iter().any(|c| c == container)
    }
}

/// Configuration of a single monitored stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Unique stream name, used as the metrics label.
    pub name: String,
    /// Master playlist URL.
    pub url: String,
    pub check_mode: CheckMode,
    /// Time between two checks of this stream.
    pub interval: Duration,
    /// Deadline for one check. Must be shorter than `interval`.
    pub timeout: Duration,
    /// Download segment bodies and probe their media content.
    pub validate_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_validation: Option<MediaValidation>,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            check_mode: CheckMode::All,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            validate_content: false,
            media_validation: None,
        }
    }

    pub fn with_check_mode(mut self, mode: CheckMode) -> Self {
        self.check_mode = mode;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_content_validation(mut self, policy: Option<MediaValidation>) -> Self {
        self.validate_content = true;
        self.media_validation = policy;
        self
    }

    /// The media policy to enforce, or `None` when content validation is
    /// disabled or no policy is configured.
    pub fn active_policy(&self) -> Option<&MediaValidation> {
        if self.validate_content {
            self.media_validation.as_ref()
        } else {
            None
        }
    }
}

/// Engine-wide settings shared by every check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Size of the background worker pool and of the in-flight fetch limit.
    pub workers: usize,
    /// Extra attempts made by the retry decorator after a failed fetch.
    pub retry_attempts: u32,
    /// Base delay between retries (doubled each attempt).
    pub retry_delay: Duration,
    /// Number of segments sampled per variant in `random` mode.
    pub segment_sample: usize,
    /// Tick of the background workers.
    pub heartbeat_interval: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            segment_sample: 3,
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

impl CheckerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_segment_sample(mut self, sample: usize) -> Self {
        self.segment_sample = sample.max(1);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Settings for the shared HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub keep_alive: bool,
    pub max_idle_conns: usize,
    pub tls_verify: bool,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            keep_alive: true,
            max_idle_conns: 10,
            tls_verify: true,
            user_agent: "hls_exporter/1.0".to_string(),
        }
    }
}
