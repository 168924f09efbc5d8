use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CheckError;

/// Outcome of one invocation of the check engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: Uuid,
    pub success: bool,
    pub stream_name: String,
    pub status: StreamStatus,
    pub segments: SegmentResults,
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
}

impl CheckResult {
    /// A blank, unsuccessful result stamped with a fresh id and the current time.
    pub fn started(stream_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: false,
            stream_name: stream_name.to_string(),
            status: StreamStatus::default(),
            segments: SegmentResults::default(),
            duration: Duration::ZERO,
            timestamp: Utc::now(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStatus {
    /// Master playlist was fetched and parsed.
    pub is_live: bool,
    pub variants_count: usize,
    /// Variants whose playlist could not be fetched, parsed or validated.
    pub failed_variants: usize,
    /// Segments examined during the check.
    pub segments_count: usize,
    /// Sum of nominal durations of the examined segments, in seconds.
    pub total_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Order-independent aggregate of per-segment outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentResults {
    pub checked: usize,
    /// Segments selected across all variants.
    pub total: usize,
    pub failed: usize,
    pub details: Vec<SegmentCheck>,
}

impl SegmentResults {
    pub fn push(&mut self, check: SegmentCheck) {
        self.checked += 1;
        if !check.success {
            self.failed += 1;
        }
        self.details.push(check);
    }

    pub fn succeeded(&self) -> usize {
        self.checked - self.failed
    }
}

impl FromIterator<SegmentCheck> for SegmentResults {
    fn from_iter<I: IntoIterator<Item = SegmentCheck>>(iter: I) -> Self {
        let mut results = Self::default();
        for check in iter {
            results.push(check);
        }
        results.total = results.checked;
        results
    }
}

/// Outcome for one selected segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCheck {
    pub url: String,
    pub success: bool,
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
}

impl SegmentCheck {
    pub fn passed(url: impl Into<String>, duration: Duration) -> Self {
        Self {
            url: url.into(),
            success: true,
            duration,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, duration: Duration, error: CheckError) -> Self {
        Self {
            url: url.into(),
            success: false,
            duration,
            error: Some(error),
        }
    }
}

/// Media properties decoded from a segment body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container identifier, `"TS"` or `"fMP4"` for probed content.
    pub container: String,
    /// Observed bitrate in bits per second, 0 when unknown.
    pub bitrate: u64,
    pub has_video: bool,
    pub has_audio: bool,
    pub is_complete: bool,
}

/// Input of the segment validator.
#[derive(Debug, Clone)]
pub struct SegmentData {
    pub uri: String,
    /// Nominal duration from the playlist, in seconds.
    pub duration: f64,
    pub size: u64,
    pub media_info: MediaInfo,
    pub headers: HeaderMap,
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::error::ErrorType;

    fn fail(url: &str) -> SegmentCheck {
        SegmentCheck::failed(
            url,
            Duration::from_millis(5),
            CheckError::new(ErrorType::SegmentDownload, "boom"),
        )
    }

    #[test]
    fn reduction_counts_failures() {
        let results: SegmentResults = vec![
            SegmentCheck::passed("a.ts", Duration::from_millis(3)),
            fail("b.ts"),
            SegmentCheck::passed("c.ts", Duration::from_millis(4)),
        ]
        .into_iter()
        .collect();

        assert_eq!(results.checked, 3);
        assert_eq!(results.failed, 1);
        assert_eq!(results.succeeded(), 2);
        assert_eq!(results.details.len(), results.checked);
    }

    #[test]
    fn reduction_is_order_independent() {
        let forward: SegmentResults =
            vec![fail("a"), SegmentCheck::passed("b", Duration::ZERO)].into_iter().collect();
        let backward: SegmentResults =
            vec![SegmentCheck::passed("b", Duration::ZERO), fail("a")].into_iter().collect();
        assert_eq!(forward.checked, backward.checked);
        assert_eq!(forward.failed, backward.failed);
    }

    #[test]
    fn result_serializes_duration_as_millis() {
        let mut result = CheckResult::started("s1");
        result.duration = Duration::from_millis(1500);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["stream_name"], "s1");
        assert!(json.get("error").is_none());
    }
}
