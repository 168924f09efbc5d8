use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::checker::{CheckResult, ErrorType};

/// Upper bounds of the `hls_response_time_seconds` histogram buckets.
pub const RESPONSE_TIME_BUCKETS: [f64; 7] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Receives the outcome of every check. Implementations are shared between
/// tasks and must tolerate concurrent calls.
pub trait MetricsSink: Send + Sync {
    fn record_check(&self, stream: &str, result: &CheckResult);

    fn set_active_checks(&self, count: usize);
}

/// Cumulative histogram over [`RESPONSE_TIME_BUCKETS`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    /// `buckets[i]` counts observations `<= RESPONSE_TIME_BUCKETS[i]`.
    pub buckets: [u64; RESPONSE_TIME_BUCKETS.len()],
    pub count: u64,
    pub sum: f64,
}

impl Histogram {
    pub fn observe(&mut self, value: f64) {
        for (bucket, bound) in self.buckets.iter_mut().zip(RESPONSE_TIME_BUCKETS) {
            if value <= bound {
                *bucket += 1;
            }
        }
        self.count += 1;
        self.sum += value;
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamMetrics {
    pub up: bool,
    pub response_time: Histogram,
    pub errors: HashMap<ErrorType, u64>,
    /// Unix timestamp (seconds) of the last check start.
    pub last_check_timestamp: f64,
    pub segments_success: u64,
    pub segments_failed: u64,
    /// Segments examined by the last check.
    pub segments_count: u64,
}

/// In-memory per-stream metrics, rendered by the HTTP API.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    streams: DashMap<String, StreamMetrics>,
    active_checks: AtomicUsize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a stream visible before its first check completes.
    pub fn register_stream(&self, name: &str) {
        self.streams.entry(name.to_string()).or_default();
    }

    pub fn stream(&self, name: &str) -> Option<StreamMetrics> {
        self.streams.get(name).map(|m| m.value().clone())
    }

    /// All streams sorted by name.
    pub fn snapshot(&self) -> Vec<(String, StreamMetrics)> {
        let mut all: Vec<_> = self
            .streams
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn active_checks(&self) -> usize {
        self.active_checks.load(Ordering::Relaxed)
    }
}

impl MetricsSink for MetricsRegistry {
    fn record_check(&self, stream: &str, result: &CheckResult) {
        let mut entry = self.streams.entry(stream.to_string()).or_default();
        let m = entry.value_mut();

        m.up = result.success;
        m.response_time.observe(result.duration.as_secs_f64());
        m.last_check_timestamp = result.timestamp.timestamp_millis() as f64 / 1000.0;
        m.segments_success += result.segments.succeeded() as u64;
        m.segments_failed += result.segments.failed as u64;
        m.segments_count = result.segments.checked as u64;
        if let Some(err) = &result.error {
            *m.errors.entry(err.error_type).or_default() += 1;
        }
    }

    fn set_active_checks(&self, count: usize) {
        self.active_checks.store(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::checker::{CheckError, SegmentCheck, SegmentResults};

    fn result(success: bool, checked: usize, failed: usize, secs: f64) -> CheckResult {
        let mut details = Vec::new();
        for i in 0..checked {
            let url = format!("seg{i}.ts");
            details.push(if i < failed {
                SegmentCheck::failed(
                    url,
                    Duration::ZERO,
                    CheckError::new(ErrorType::SegmentDownload, "x"),
                )
            } else {
                SegmentCheck::passed(url, Duration::ZERO)
            });
        }
        let mut r = CheckResult::started("live");
        r.success = success;
        r.segments = details.into_iter().collect::<SegmentResults>();
        r.duration = Duration::from_secs_f64(secs);
        if !success {
            r.error = Some(CheckError::new(ErrorType::SegmentValidate, "1 of 3 failed"));
        }
        r
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let mut h = Histogram::default();
        h.observe(0.2);
        h.observe(3.0);
        h.observe(42.0);
        assert_eq!(h.buckets, [0, 1, 1, 1, 1, 2, 2]);
        assert_eq!(h.count, 3);
        assert!((h.sum - 45.2).abs() < 1e-9);
    }

    #[test]
    fn record_successful_check() {
        let registry = MetricsRegistry::new();
        registry.record_check("live", &result(true, 3, 0, 0.4));

        let m = registry.stream("live").unwrap();
        assert!(m.up);
        assert_eq!(m.segments_success, 3);
        assert_eq!(m.segments_failed, 0);
        assert_eq!(m.segments_count, 3);
        assert_eq!(m.response_time.count, 1);
        assert!(m.errors.is_empty());
        assert!(m.last_check_timestamp > 0.0);
    }

    #[test]
    fn record_failed_check_counts_error_type() {
        let registry = MetricsRegistry::new();
        registry.record_check("live", &result(false, 3, 1, 0.4));
        registry.record_check("live", &result(false, 3, 1, 0.4));

        let m = registry.stream("live").unwrap();
        assert!(!m.up);
        assert_eq!(m.segments_success, 4);
        assert_eq!(m.segments_failed, 2);
        assert_eq!(m.errors.get(&ErrorType::SegmentValidate), Some(&2));
    }

    #[test]
    fn registered_stream_appears_in_snapshot() {
        let registry = MetricsRegistry::new();
        registry.register_stream("b");
        registry.register_stream("a");
        let names: Vec<_> = registry.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        registry.record_check("live", &result(true, 1, 0, 0.1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.stream("live").unwrap().response_time.count, 400);
    }

    #[test]
    fn active_checks_gauge() {
        let registry = MetricsRegistry::new();
        registry.set_active_checks(4);
        assert_eq!(registry.active_checks(), 4);
    }
}
