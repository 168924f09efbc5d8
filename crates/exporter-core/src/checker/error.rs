use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loader::FetchError;
use crate::playlist::ParseError;

use super::result::CheckResult;

/// Top-level classification attached to check and segment errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    PlaylistDownload,
    PlaylistParse,
    SegmentDownload,
    SegmentValidate,
    MediaContainer,
}

impl ErrorType {
    pub const ALL: [ErrorType; 5] = [
        Self::PlaylistDownload,
        Self::PlaylistParse,
        Self::SegmentDownload,
        Self::SegmentValidate,
        Self::MediaContainer,
    ];

    /// Metrics label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlaylistDownload => "playlist_download",
            Self::PlaylistParse => "playlist_parse",
            Self::SegmentDownload => "segment_download",
            Self::SegmentValidate => "segment_validate",
            Self::MediaContainer => "media_container",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained reason for a segment failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    SegmentSize,
    SegmentStatus,
    ContainerType,
    NoVideo,
    NoAudio,
    CorruptedMedia,
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentSize => write!(f, "segment_size"),
            Self::SegmentStatus => write!(f, "segment_status"),
            Self::ContainerType => write!(f, "container_type"),
            Self::NoVideo => write!(f, "no_video"),
            Self::NoAudio => write!(f, "no_audio"),
            Self::CorruptedMedia => write!(f, "corrupted_media"),
        }
    }
}

/// Structural problems in a parsed master or media playlist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    #[error("empty playlist")]
    EmptyPlaylist,
    #[error("no variants in master playlist")]
    NoVariants,
    #[error("empty URI in variant {index}")]
    EmptyVariantUri { index: usize },
    #[error("no segments in media playlist")]
    NoSegments,
    #[error("invalid segment sequence: {current} follows {previous}")]
    NonMonotonicSequence { previous: u64, current: u64 },
}

/// Reasons a downloaded segment is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentValidationError {
    #[error("empty segment")]
    EmptySegment,
    #[error("invalid segment duration: {0}")]
    InvalidDuration(f64),
    #[error("invalid container type: {0}")]
    InvalidContainer(String),
    #[error("segment size {size} less than minimum {minimum}")]
    UndersizedSegment { size: u64, minimum: u64 },
    #[error("no video track found")]
    MissingVideoTrack,
    #[error("no audio track found")]
    MissingAudioTrack,
    #[error("segment media is truncated or corrupted")]
    CorruptedMedia,
}

impl SegmentValidationError {
    pub fn kind(&self) -> ValidationType {
        match self {
            Self::EmptySegment | Self::InvalidDuration(_) | Self::UndersizedSegment { .. } => {
                ValidationType::SegmentSize
            }
            Self::InvalidContainer(_) => ValidationType::ContainerType,
            Self::MissingVideoTrack => ValidationType::NoVideo,
            Self::MissingAudioTrack => ValidationType::NoAudio,
            Self::CorruptedMedia => ValidationType::CorruptedMedia,
        }
    }
}

/// Error attached to a [`CheckResult`] or a single segment check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{error_type}: {message}")]
pub struct CheckError {
    pub error_type: ErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationType>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub retryable: bool,
}

impl CheckError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            validation: None,
            message: message.into(),
            status_code: None,
            retryable: false,
        }
    }

    pub fn with_validation(mut self, validation: ValidationType) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wrap a transport error for the playlist stage.
    pub fn playlist_download(err: &FetchError) -> Self {
        Self::from_fetch(ErrorType::PlaylistDownload, err)
    }

    pub fn playlist_parse(err: &ParseError) -> Self {
        Self::new(ErrorType::PlaylistParse, err.to_string())
    }

    pub fn playlist_invalid(err: &PlaylistError) -> Self {
        Self::new(ErrorType::PlaylistParse, err.to_string())
    }

    /// Wrap a transport error for a segment. Probe failures are tagged
    /// [`ErrorType::MediaContainer`], non-200 statuses carry
    /// [`ValidationType::SegmentStatus`].
    pub fn segment_download(err: &FetchError) -> Self {
        match err {
            FetchError::Probe { .. } => Self::from_fetch(ErrorType::MediaContainer, err)
                .with_validation(ValidationType::CorruptedMedia),
            FetchError::Http { .. } => Self::from_fetch(ErrorType::SegmentDownload, err)
                .with_validation(ValidationType::SegmentStatus),
            _ => Self::from_fetch(ErrorType::SegmentDownload, err),
        }
    }

    pub fn segment_invalid(err: &SegmentValidationError) -> Self {
        Self::new(ErrorType::SegmentValidate, err.to_string()).with_validation(err.kind())
    }

    fn from_fetch(error_type: ErrorType, err: &FetchError) -> Self {
        let mut e = Self::new(error_type, err.to_string()).with_retryable(err.is_retryable());
        if let Some(code) = err.status_code() {
            e = e.with_status_code(code);
        }
        e
    }
}

/// Returned by [`StreamChecker::check`](super::StreamChecker::check) when the
/// check did not succeed. Carries the full result alongside the error.
#[derive(Debug, Clone, Error)]
#[error("check of stream '{}' failed: {error}", result.stream_name)]
pub struct CheckFailure {
    pub error: CheckError,
    pub result: Box<CheckResult>,
}

impl CheckFailure {
    pub fn into_result(self) -> CheckResult {
        *self.result
    }
}
