#![forbid(unsafe_code)]

pub mod checker;
pub mod config;
pub mod loader;
pub mod media;
pub mod metrics;
pub mod playlist;

pub use checker::{
    CheckError, CheckFailure, CheckResult, ErrorType, SegmentCheck, StreamChecker, StreamStatus,
    ValidationType,
};
pub use config::{CheckMode, CheckerConfig, HttpConfig, MediaValidation, StreamConfig};
pub use loader::{
    FetchError, HttpFetcher, PlaylistFetcher, PlaylistResponse, RetryFetcher, SegmentFetcher,
    SegmentResponse,
};
pub use metrics::{MetricsRegistry, MetricsSink, StreamMetrics};
