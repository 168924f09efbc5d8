//! M3U8 parsing adapter.
//!
//! Parsed `m3u8-rs` structures are reduced to the snapshots the validators
//! and the check engine work with.

use m3u8_rs::Playlist;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid M3U8 playlist: {0}")]
    Syntax(String),
    #[error("expected a master playlist but got a media playlist")]
    NotMaster,
    #[error("expected a media playlist but got a master playlist")]
    NotMedia,
}

/// A variant stream listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRef {
    pub uri: String,
    pub bandwidth: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterSnapshot {
    pub variants: Vec<VariantRef>,
}

/// A media segment with its absolute sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub sequence: u64,
    pub uri: String,
    /// Nominal duration from `#EXTINF`, in seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaSnapshot {
    pub media_sequence: u64,
    pub target_duration: f64,
    /// `#EXT-X-ENDLIST` is present.
    pub end_list: bool,
    pub segments: Vec<SegmentRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlaylist {
    Master(MasterSnapshot),
    Media(MediaSnapshot),
}

pub fn parse(body: &[u8]) -> Result<ParsedPlaylist, ParseError> {
    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(pl)) => Ok(ParsedPlaylist::Master(master_to_snapshot(&pl))),
        Ok(Playlist::MediaPlaylist(pl)) => Ok(ParsedPlaylist::Media(media_to_snapshot(&pl))),
        Err(e) => Err(ParseError::Syntax(e.to_string())),
    }
}

pub fn parse_master(body: &[u8]) -> Result<MasterSnapshot, ParseError> {
    match parse(body)? {
        ParsedPlaylist::Master(master) => Ok(master),
        ParsedPlaylist::Media(_) => Err(ParseError::NotMaster),
    }
}

pub fn parse_media(body: &[u8]) -> Result<MediaSnapshot, ParseError> {
    match parse(body)? {
        ParsedPlaylist::Media(media) => Ok(media),
        ParsedPlaylist::Master(_) => Err(ParseError::NotMedia),
    }
}

// I-frame playlists are trick-play renditions and are not probed.
fn master_to_snapshot(pl: &m3u8_rs::MasterPlaylist) -> MasterSnapshot {
    MasterSnapshot {
        variants: pl
            .variants
            .iter()
            .filter(|v| !v.is_i_frame)
            .map(|v| VariantRef {
                uri: v.uri.clone(),
                bandwidth: v.bandwidth,
            })
            .collect(),
    }
}

fn media_to_snapshot(pl: &m3u8_rs::MediaPlaylist) -> MediaSnapshot {
    let segments = pl
        .segments
        .iter()
        .enumerate()
        .map(|(i, seg)| SegmentRef {
            sequence: pl.media_sequence.saturating_add(i as u64),
            uri: seg.uri.clone(),
            duration: f64::from(seg.duration),
        })
        .collect();

    MediaSnapshot {
        media_sequence: pl.media_sequence,
        target_duration: pl.target_duration as f64,
        end_list: pl.end_list,
        segments,
    }
}

/// Resolve `reference` against the URL of the playlist that contains it.
///
/// Absolute references are returned unchanged. If `base` is not a valid URL
/// the reference is returned as-is.
pub fn resolve_uri(base: &str, reference: &str) -> String {
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(url) => url.to_string(),
        Err(_) => reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1280x720
https://cdn.example.com/high/index.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=100000,URI=\"iframe.m3u8\"
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:42
#EXTINF:9.5,
seg42.ts
#EXTINF:10.0,
seg43.ts
#EXT-X-ENDLIST
";

    #[test]
    fn parses_master_variants() {
        let master = parse_master(MASTER.as_bytes()).unwrap();
        assert_eq!(master.variants.len(), 2);
        assert_eq!(master.variants[0].uri, "low/index.m3u8");
        assert_eq!(master.variants[0].bandwidth, 800_000);
        assert_eq!(master.variants[1].uri, "https://cdn.example.com/high/index.m3u8");
    }

    #[test]
    fn parses_media_segments_with_sequence_numbers() {
        let media = parse_media(MEDIA.as_bytes()).unwrap();
        assert_eq!(media.media_sequence, 42);
        assert!(media.end_list);
        assert_eq!(media.target_duration, 10.0);
        let seqs: Vec<u64> = media.segments.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![42, 43]);
        assert_eq!(media.segments[0].uri, "seg42.ts");
        assert!((media.segments[0].duration - 9.5).abs() < 1e-6);
    }

    #[test]
    fn sequence_numbers_stop_at_u64_max() {
        let playlist = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:18446744073709551615
#EXTINF:10.0,
a.ts
#EXTINF:10.0,
b.ts
";
        let media = parse_media(playlist.as_bytes()).unwrap();
        let seqs: Vec<u64> = media.segments.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![u64::MAX, u64::MAX]);
        assert!(crate::checker::validate_media(Some(&media)).is_ok());
    }

    #[test]
    fn media_where_master_expected() {
        assert_eq!(parse_master(MEDIA.as_bytes()), Err(ParseError::NotMaster));
        assert_eq!(parse_media(MASTER.as_bytes()), Err(ParseError::NotMedia));
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        assert!(matches!(
            parse(b"<html>502 Bad Gateway</html>"),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn resolve_relative_reference() {
        assert_eq!(
            resolve_uri("https://example.com/live/master.m3u8", "720p/index.m3u8"),
            "https://example.com/live/720p/index.m3u8"
        );
    }

    #[test]
    fn resolve_parent_reference() {
        assert_eq!(
            resolve_uri("https://example.com/live/720p/index.m3u8", "../segments/seg1.ts"),
            "https://example.com/live/segments/seg1.ts"
        );
    }

    #[test]
    fn resolve_root_relative_reference() {
        assert_eq!(
            resolve_uri("https://example.com/live/720p/index.m3u8", "/other/seg1.ts"),
            "https://example.com/other/seg1.ts"
        );
    }

    #[test]
    fn absolute_reference_is_unchanged() {
        let abs = "https://cdn2.example.net/path/seg.ts?token=abc";
        assert_eq!(resolve_uri("https://example.com/master.m3u8", abs), abs);
    }

    #[test]
    fn invalid_base_returns_reference() {
        assert_eq!(resolve_uri("not a url", "seg.ts"), "seg.ts");
    }
}
