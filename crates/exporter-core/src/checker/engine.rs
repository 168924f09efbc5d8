use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use reqwest::header::{HeaderMap, LAST_MODIFIED};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CheckMode, CheckerConfig, MediaValidation, StreamConfig};
use crate::loader::{FetchError, PlaylistFetcher, PlaylistResponse, SegmentFetcher, SegmentResponse};
use crate::metrics::MetricsSink;
use crate::playlist::{self, SegmentRef};

use super::error::{CheckError, CheckFailure, ErrorType};
use super::lifecycle::Lifecycle;
use super::result::{CheckResult, SegmentCheck, SegmentData, SegmentResults};
use super::segment::validate_segment;
use super::select::select_segments;
use super::validator::{validate_master, validate_media};

/// Runs stream checks: master playlist, then every variant and its selected
/// segments concurrently, aggregated into one [`CheckResult`].
pub struct StreamChecker {
    playlists: Arc<dyn PlaylistFetcher>,
    segments: Arc<dyn SegmentFetcher>,
    pub(super) metrics: Arc<dyn MetricsSink>,
    pub(super) config: CheckerConfig,
    fetch_limit: Arc<Semaphore>,
    pub(super) active: Arc<AtomicUsize>,
    pub(super) lifecycle: Mutex<Lifecycle>,
}

impl StreamChecker {
    pub fn new<F>(fetcher: Arc<F>, metrics: Arc<dyn MetricsSink>, config: CheckerConfig) -> Self
    where
        F: PlaylistFetcher + SegmentFetcher + 'static,
    {
        Self::with_fetchers(fetcher.clone(), fetcher, metrics, config)
    }

    pub fn with_fetchers(
        playlists: Arc<dyn PlaylistFetcher>,
        segments: Arc<dyn SegmentFetcher>,
        metrics: Arc<dyn MetricsSink>,
        config: CheckerConfig,
    ) -> Self {
        let permits = config.workers.max(1);
        Self {
            playlists,
            segments,
            metrics,
            fetch_limit: Arc::new(Semaphore::new(permits)),
            active: Arc::new(AtomicUsize::new(0)),
            lifecycle: Mutex::new(Lifecycle::default()),
            config,
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Checks currently executing.
    pub fn active_checks(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Check one stream within `timeout`.
    ///
    /// Metrics are recorded exactly once per call. On failure the complete
    /// result travels inside the returned [`CheckFailure`].
    pub async fn check(
        &self,
        timeout: Duration,
        stream: &StreamConfig,
    ) -> Result<CheckResult, CheckFailure> {
        let _active = ActiveGuard::enter(&self.active);
        let started = Instant::now();
        let mut result = CheckResult::started(&stream.name);

        let cancel = self.lifecycle.lock().await.token().child_token();
        let _cancel_on_exit = cancel.clone().drop_guard();
        let deadline = tokio::time::Instant::now() + timeout;
        tokio::spawn(watch_deadline(cancel.clone(), deadline));

        let ctx = FetchContext {
            playlists: Arc::clone(&self.playlists),
            segments: Arc::clone(&self.segments),
            limit: Arc::clone(&self.fetch_limit),
            cancel,
            deadline,
        };

        debug!(stream = %stream.name, check_id = %result.id, url = %stream.url, "Starting check");
        let error = self.run(&ctx, stream, &mut result).await;

        result.duration = started.elapsed();
        result.success = error.is_none();
        result.error = error.clone();
        self.metrics.record_check(&stream.name, &result);

        match error {
            None => {
                info!(
                    stream = %stream.name,
                    check_id = %result.id,
                    variants = result.status.variants_count,
                    segments = result.segments.checked,
                    duration_ms = result.duration.as_millis() as u64,
                    "Check succeeded"
                );
                Ok(result)
            }
            Some(error) => {
                warn!(
                    stream = %stream.name,
                    check_id = %result.id,
                    error_type = %error.error_type,
                    error = %error.message,
                    "Check failed"
                );
                Err(CheckFailure {
                    error,
                    result: Box::new(result),
                })
            }
        }
    }

    async fn run(
        &self,
        ctx: &FetchContext,
        stream: &StreamConfig,
        result: &mut CheckResult,
    ) -> Option<CheckError> {
        let response = match ctx.fetch_playlist(&stream.url).await {
            Ok(r) => r,
            Err(e) => return Some(CheckError::playlist_download(&e)),
        };
        result.status.last_modified = last_modified(&response.headers);

        let master = match playlist::parse_master(&response.body) {
            Ok(m) => m,
            Err(e) => return Some(CheckError::playlist_parse(&e)),
        };
        if let Err(e) = validate_master(Some(&master)) {
            return Some(CheckError::playlist_invalid(&e));
        }
        result.status.is_live = true;
        result.status.variants_count = master.variants.len();

        let plan = VariantPlan {
            mode: stream.check_mode,
            sample: self.config.segment_sample,
            validate_content: stream.validate_content,
            policy: stream.active_policy().cloned().map(Arc::new),
        };

        let mut tasks = JoinSet::new();
        for (index, variant) in master.variants.iter().enumerate() {
            let url = playlist::resolve_uri(&stream.url, &variant.uri);
            let ctx = ctx.clone();
            let plan = plan.clone();
            tasks.spawn(async move {
                AssertUnwindSafe(check_variant(ctx, url.clone(), plan))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        VariantOutcome::failed(
                            url,
                            CheckError::new(ErrorType::PlaylistDownload, "variant task panicked"),
                        )
                    })
                    .at(index)
            });
        }

        let mut outcomes = Vec::with_capacity(master.variants.len());
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.unwrap_or_else(|e| {
                VariantOutcome::failed(
                    String::new(),
                    CheckError::new(ErrorType::PlaylistDownload, format!("variant task failed: {e}")),
                )
                .at(usize::MAX)
            }));
        }
        outcomes.sort_by_key(|o| o.index);

        let mut segments = SegmentResults::default();
        let mut first_variant_error = None;
        for outcome in outcomes {
            segments.total += outcome.selected;
            result.status.total_duration += outcome.nominal_duration;
            if let Some(error) = outcome.error {
                warn!(
                    stream = %stream.name,
                    check_id = %result.id,
                    url = %outcome.url,
                    error = %error,
                    "Variant check failed"
                );
                result.status.failed_variants += 1;
                first_variant_error.get_or_insert(error);
            }
            for check in outcome.checks {
                segments.push(check);
            }
        }
        result.status.segments_count = segments.checked;
        result.segments = segments;

        if result.segments.failed > 0 {
            return Some(CheckError::new(
                ErrorType::SegmentValidate,
                format!(
                    "{} of {} segments failed validation",
                    result.segments.failed, result.segments.checked
                ),
            ));
        }
        first_variant_error.map(|first| {
            CheckError::new(
                first.error_type,
                format!(
                    "{} of {} variant playlists failed",
                    result.status.failed_variants, result.status.variants_count
                ),
            )
        })
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn watch_deadline(cancel: CancellationToken, deadline: tokio::time::Instant) {
    tokio::select! {
        _ = tokio::time::sleep_until(deadline) => cancel.cancel(),
        _ = cancel.cancelled() => {}
    }
}

fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Shared handles for every fetch of one check.
#[derive(Clone)]
struct FetchContext {
    playlists: Arc<dyn PlaylistFetcher>,
    segments: Arc<dyn SegmentFetcher>,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
    deadline: tokio::time::Instant,
}

impl FetchContext {
    fn interrupted(&self, url: &str) -> FetchError {
        if tokio::time::Instant::now() >= self.deadline {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Cancelled {
                url: url.to_string(),
            }
        }
    }

    /// Run `fetch` holding one permit. The future is dropped, aborting the
    /// request, as soon as the check is cancelled.
    async fn guarded<T>(
        &self,
        url: &str,
        fetch: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.interrupted(url)),
            permit = self.limit.acquire() => permit.map_err(|_| self.interrupted(url))?,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(self.interrupted(url)),
            res = fetch => res,
        }
    }

    async fn fetch_playlist(&self, url: &str) -> Result<PlaylistResponse, FetchError> {
        self.guarded(url, self.playlists.fetch_playlist(url)).await
    }

    async fn fetch_segment(
        &self,
        url: &str,
        validate_content: bool,
    ) -> Result<SegmentResponse, FetchError> {
        self.guarded(url, self.segments.fetch_segment(url, validate_content))
            .await
    }
}

#[derive(Clone)]
struct VariantPlan {
    mode: CheckMode,
    sample: usize,
    validate_content: bool,
    policy: Option<Arc<MediaValidation>>,
}

struct VariantOutcome {
    index: usize,
    url: String,
    error: Option<CheckError>,
    selected: usize,
    nominal_duration: f64,
    checks: Vec<SegmentCheck>,
}

impl VariantOutcome {
    fn failed(url: String, error: CheckError) -> Self {
        Self {
            index: 0,
            url,
            error: Some(error),
            selected: 0,
            nominal_duration: 0.0,
            checks: Vec::new(),
        }
    }

    fn at(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

async fn check_variant(ctx: FetchContext, url: String, plan: VariantPlan) -> VariantOutcome {
    let response = match ctx.fetch_playlist(&url).await {
        Ok(r) => r,
        Err(e) => return VariantOutcome::failed(url, CheckError::playlist_download(&e)),
    };
    let media = match playlist::parse_media(&response.body) {
        Ok(m) => m,
        Err(e) => return VariantOutcome::failed(url, CheckError::playlist_parse(&e)),
    };
    if let Err(e) = validate_media(Some(&media)) {
        return VariantOutcome::failed(url, CheckError::playlist_invalid(&e));
    }

    let resolved: Vec<SegmentRef> = media
        .segments
        .into_iter()
        .filter(|s| !s.uri.trim().is_empty())
        .map(|mut s| {
            s.uri = playlist::resolve_uri(&url, &s.uri);
            s
        })
        .collect();
    let selected = select_segments(&resolved, plan.mode, plan.sample);
    debug!(url = %url, available = resolved.len(), selected = selected.len(), "Checking variant");

    let mut tasks = JoinSet::new();
    let mut nominal_duration = 0.0;
    for segment in selected.iter().cloned() {
        nominal_duration += segment.duration;
        let ctx = ctx.clone();
        let policy = plan.policy.clone();
        let validate_content = plan.validate_content;
        tasks.spawn(async move {
            let seg_url = segment.uri.clone();
            AssertUnwindSafe(check_segment(ctx, segment, validate_content, policy))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    SegmentCheck::failed(
                        seg_url,
                        Duration::ZERO,
                        CheckError::new(ErrorType::SegmentDownload, "segment task panicked"),
                    )
                })
        });
    }

    let mut checks = Vec::with_capacity(selected.len());
    while let Some(joined) = tasks.join_next().await {
        checks.push(joined.unwrap_or_else(|e| {
            SegmentCheck::failed(
                String::new(),
                Duration::ZERO,
                CheckError::new(ErrorType::SegmentDownload, format!("segment task failed: {e}")),
            )
        }));
    }

    VariantOutcome {
        index: 0,
        url,
        error: None,
        selected: selected.len(),
        nominal_duration,
        checks,
    }
}

async fn check_segment(
    ctx: FetchContext,
    segment: SegmentRef,
    validate_content: bool,
    policy: Option<Arc<MediaValidation>>,
) -> SegmentCheck {
    let started = Instant::now();
    let response = match ctx.fetch_segment(&segment.uri, validate_content).await {
        Ok(r) => r,
        Err(e) => {
            debug!(url = %segment.uri, error = %e, "Segment download failed");
            return SegmentCheck::failed(
                segment.uri,
                started.elapsed(),
                CheckError::segment_download(&e),
            );
        }
    };

    let fetch_duration = response.duration;
    let data = SegmentData {
        uri: segment.uri,
        duration: segment.duration,
        size: response.size,
        media_info: response.media_info,
        headers: response.headers,
    };
    match validate_segment(&data, policy.as_deref()) {
        Ok(()) => {
            debug!(url = %data.uri, size = data.size, "Segment ok");
            SegmentCheck::passed(data.uri, fetch_duration)
        }
        Err(e) => {
            debug!(url = %data.uri, error = %e, "Segment validation failed");
            SegmentCheck::failed(data.uri, fetch_duration, CheckError::segment_invalid(&e))
        }
    }
}
