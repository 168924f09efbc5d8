use std::fmt::{self, Write};

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use exporter_core::metrics::RESPONSE_TIME_BUCKETS;
use exporter_core::{ErrorType, MetricsRegistry};

use crate::error::ApiError;
use crate::state::AppState;

pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = render(&state.metrics).map_err(|e| ApiError::Render(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body))
}

/// Label values may not contain raw quotes, backslashes or newlines.
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn family(out: &mut String, name: &str, kind: &str, help: &str) -> fmt::Result {
    writeln!(out, "# TYPE {} {}", name, kind)?;
    writeln!(out, "# HELP {} {}", name, help)
}

pub fn render(registry: &MetricsRegistry) -> Result<String, fmt::Error> {
    let mut out = String::with_capacity(4096);
    let streams: Vec<_> = registry
        .snapshot()
        .into_iter()
        .map(|(name, m)| (escape(&name), m))
        .collect();

    family(&mut out, "hls_stream_up", "gauge", "Stream availability (1 = up, 0 = down)")?;
    for (name, m) in &streams {
        writeln!(out, "hls_stream_up{{name=\"{}\"}} {}", name, u8::from(m.up))?;
    }

    family(
        &mut out,
        "hls_response_time_seconds",
        "histogram",
        "Duration of a full stream check",
    )?;
    for (name, m) in &streams {
        let h = &m.response_time;
        for (bound, count) in RESPONSE_TIME_BUCKETS.iter().zip(h.buckets) {
            writeln!(
                out,
                "hls_response_time_seconds_bucket{{name=\"{}\",type=\"total\",le=\"{:?}\"}} {}",
                name, bound, count
            )?;
        }
        writeln!(
            out,
            "hls_response_time_seconds_bucket{{name=\"{}\",type=\"total\",le=\"+Inf\"}} {}",
            name, h.count
        )?;
        writeln!(
            out,
            "hls_response_time_seconds_count{{name=\"{}\",type=\"total\"}} {}",
            name, h.count
        )?;
        writeln!(
            out,
            "hls_response_time_seconds_sum{{name=\"{}\",type=\"total\"}} {}",
            name, h.sum
        )?;
    }

    family(&mut out, "hls_errors", "counter", "Failed checks by error type")?;
    for (name, m) in &streams {
        for error_type in ErrorType::ALL {
            writeln!(
                out,
                "hls_errors_total{{name=\"{}\",error_type=\"{}\"}} {}",
                name,
                error_type,
                m.errors.get(&error_type).copied().unwrap_or(0)
            )?;
        }
    }

    family(
        &mut out,
        "hls_last_check_timestamp",
        "gauge",
        "Unix timestamp of the last check",
    )?;
    for (name, m) in &streams {
        writeln!(
            out,
            "hls_last_check_timestamp{{name=\"{}\"}} {:.3}",
            name, m.last_check_timestamp
        )?;
    }

    family(&mut out, "hls_segments_checked", "counter", "Segments checked by outcome")?;
    for (name, m) in &streams {
        writeln!(
            out,
            "hls_segments_checked_total{{name=\"{}\",status=\"success\"}} {}",
            name, m.segments_success
        )?;
        writeln!(
            out,
            "hls_segments_checked_total{{name=\"{}\",status=\"failed\"}} {}",
            name, m.segments_failed
        )?;
    }

    family(
        &mut out,
        "hls_segments_count",
        "gauge",
        "Segments examined by the last check",
    )?;
    for (name, m) in &streams {
        writeln!(out, "hls_segments_count{{name=\"{}\"}} {}", name, m.segments_count)?;
    }

    family(&mut out, "hls_active_checks", "gauge", "Checks currently running")?;
    writeln!(out, "hls_active_checks {}", registry.active_checks())?;

    writeln!(out, "# EOF")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_still_renders_families() {
        let text = render(&MetricsRegistry::new()).unwrap();
        assert!(text.contains("# TYPE hls_stream_up gauge"));
        assert!(text.contains("hls_active_checks 0"));
        assert!(text.ends_with("# EOF\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn registered_stream_has_zeroed_series() {
        let registry = MetricsRegistry::new();
        registry.register_stream("news");
        let text = render(&registry).unwrap();
        assert!(text.contains("hls_stream_up{name=\"news\"} 0"));
        assert!(text.contains(
            "hls_response_time_seconds_bucket{name=\"news\",type=\"total\",le=\"0.1\"} 0"
        ));
        assert!(text.contains(
            "hls_errors_total{name=\"news\",error_type=\"playlist_download\"} 0"
        ));
    }
}
