use crate::playlist::{MasterSnapshot, MediaSnapshot};

use super::error::PlaylistError;

/// Structural checks on a master playlist. Unknown tags never matter here,
/// the parser has already dropped them.
pub fn validate_master(master: Option<&MasterSnapshot>) -> Result<(), PlaylistError> {
    let master = master.ok_or(PlaylistError::EmptyPlaylist)?;
    if master.variants.is_empty() {
        return Err(PlaylistError::NoVariants);
    }
    if let Some(index) = master.variants.iter().position(|v| v.uri.trim().is_empty()) {
        return Err(PlaylistError::EmptyVariantUri { index });
    }
    Ok(())
}

/// Structural checks on a variant playlist. Sequence numbers must not
/// decrease; segments without a URI are ignored by the scan.
pub fn validate_media(media: Option<&MediaSnapshot>) -> Result<(), PlaylistError> {
    let media = media.ok_or(PlaylistError::EmptyPlaylist)?;
    if media.segments.is_empty() {
        return Err(PlaylistError::NoSegments);
    }

    let mut previous: Option<u64> = None;
    for segment in media.segments.iter().filter(|s| !s.uri.trim().is_empty()) {
        if let Some(prev) = previous {
            if segment.sequence < prev {
                return Err(PlaylistError::NonMonotonicSequence {
                    previous: prev,
                    current: segment.sequence,
                });
            }
        }
        previous = Some(segment.sequence);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{SegmentRef, VariantRef};

    fn variant(uri: &str) -> VariantRef {
        VariantRef {
            uri: uri.to_string(),
            bandwidth: 1_000_000,
        }
    }

    fn segment(sequence: u64, uri: &str) -> SegmentRef {
        SegmentRef {
            sequence,
            uri: uri.to_string(),
            duration: 6.0,
        }
    }

    fn media(segments: Vec<SegmentRef>) -> MediaSnapshot {
        MediaSnapshot {
            segments,
            ..MediaSnapshot::default()
        }
    }

    #[test]
    fn master_absent() {
        assert_eq!(validate_master(None), Err(PlaylistError::EmptyPlaylist));
    }

    #[test]
    fn master_without_variants() {
        let master = MasterSnapshot::default();
        assert_eq!(validate_master(Some(&master)), Err(PlaylistError::NoVariants));
    }

    #[test]
    fn master_with_blank_variant_uri() {
        let master = MasterSnapshot {
            variants: vec![variant("low.m3u8"), variant("  ")],
        };
        assert_eq!(
            validate_master(Some(&master)),
            Err(PlaylistError::EmptyVariantUri { index: 1 })
        );
    }

    #[test]
    fn master_valid() {
        let master = MasterSnapshot {
            variants: vec![variant("low.m3u8"), variant("high.m3u8")],
        };
        assert!(validate_master(Some(&master)).is_ok());
    }

    #[test]
    fn media_absent_or_empty() {
        assert_eq!(validate_media(None), Err(PlaylistError::EmptyPlaylist));
        assert_eq!(
            validate_media(Some(&media(vec![]))),
            Err(PlaylistError::NoSegments)
        );
    }

    #[test]
    fn media_sequence_may_repeat() {
        let pl = media(vec![segment(5, "a.ts"), segment(5, "b.ts"), segment(6, "c.ts")]);
        assert!(validate_media(Some(&pl)).is_ok());
    }

    #[test]
    fn media_sequence_must_not_decrease() {
        let pl = media(vec![segment(7, "a.ts"), segment(6, "b.ts")]);
        assert_eq!(
            validate_media(Some(&pl)),
            Err(PlaylistError::NonMonotonicSequence {
                previous: 7,
                current: 6
            })
        );
    }

    #[test]
    fn media_skips_segments_without_uri() {
        let pl = media(vec![segment(7, "a.ts"), segment(1, ""), segment(8, "b.ts")]);
        assert!(validate_media(Some(&pl)).is_ok());
    }
}
