use crate::config::MediaValidation;

use super::error::SegmentValidationError;
use super::result::SegmentData;

/// Validate one downloaded segment.
///
/// Basic checks always run. Media checks run only when `policy` is given,
/// which the engine does only for streams with content validation enabled.
pub fn validate_segment(
    data: &SegmentData,
    policy: Option<&MediaValidation>,
) -> Result<(), SegmentValidationError> {
    validate_basic(data)?;
    match policy {
        Some(policy) => validate_media(data, policy),
        None => Ok(()),
    }
}

pub fn validate_basic(data: &SegmentData) -> Result<(), SegmentValidationError> {
    if data.size == 0 {
        return Err(SegmentValidationError::EmptySegment);
    }
    if data.duration.is_nan() || data.duration <= 0.0 {
        return Err(SegmentValidationError::InvalidDuration(data.duration));
    }
    Ok(())
}

/// Policy checks in fixed order; the first failure wins.
pub fn validate_media(
    data: &SegmentData,
    policy: &MediaValidation,
) -> Result<(), SegmentValidationError> {
    let info = &data.media_info;
    if !policy.allows_container(&info.container) {
        return Err(SegmentValidationError::InvalidContainer(info.container.clone()));
    }
    if data.size < policy.min_segment_size {
        return Err(SegmentValidationError::UndersizedSegment {
            size: data.size,
            minimum: policy.min_segment_size,
        });
    }
    if policy.check_video && !info.has_video {
        return Err(SegmentValidationError::MissingVideoTrack);
    }
    if policy.check_audio && !info.has_audio {
        return Err(SegmentValidationError::MissingAudioTrack);
    }
    if !info.is_complete {
        return Err(SegmentValidationError::CorruptedMedia);
    }
    Ok(())
}
