mod engine;
pub mod error;
mod lifecycle;
pub mod result;
pub mod segment;
pub mod select;
pub mod validator;

pub use engine::StreamChecker;
pub use error::{
    CheckError, CheckFailure, ErrorType, PlaylistError, SegmentValidationError, ValidationType,
};
pub use result::{CheckResult, MediaInfo, SegmentCheck, SegmentData, SegmentResults, StreamStatus};
pub use segment::validate_segment;
pub use select::select_segments;
pub use validator::{validate_master, validate_media};
