use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use exporter_core::CheckResult;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StreamSummary {
    pub name: String,
    pub up: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub variants: usize,
    pub segments_checked: usize,
    pub segments_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamSummary {
    fn pending(name: String) -> Self {
        Self {
            name,
            up: false,
            last_check: None,
            duration_ms: None,
            variants: 0,
            segments_checked: 0,
            segments_failed: 0,
            error: None,
        }
    }

    fn from_result(result: &CheckResult) -> Self {
        Self {
            name: result.stream_name.clone(),
            up: result.success,
            last_check: Some(result.timestamp),
            duration_ms: Some(result.duration.as_millis() as u64),
            variants: result.status.variants_count,
            segments_checked: result.segments.checked,
            segments_failed: result.segments.failed,
            error: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Every known stream, including ones still waiting for their first check.
pub async fn list_streams(State(state): State<AppState>) -> Json<Vec<StreamSummary>> {
    let summaries = state
        .metrics
        .snapshot()
        .into_iter()
        .map(|(name, _)| match state.results.get(&name) {
            Some(result) => StreamSummary::from_result(result.value()),
            None => StreamSummary::pending(name),
        })
        .collect();
    Json(summaries)
}

pub async fn get_stream(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CheckResult>, ApiError> {
    state
        .results
        .get(&name)
        .map(|r| Json(r.value().clone()))
        .ok_or(ApiError::UnknownStream(name))
}
