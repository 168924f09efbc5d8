//! Periodic polling of every configured stream.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use exporter_core::{CheckResult, StreamChecker, StreamConfig};

pub struct Scheduler {
    checker: Arc<StreamChecker>,
    results: Arc<DashMap<String, CheckResult>>,
    cancel: CancellationToken,
    pollers: JoinSet<()>,
}

impl Scheduler {
    pub fn new(checker: Arc<StreamChecker>, results: Arc<DashMap<String, CheckResult>>) -> Self {
        Self {
            checker,
            results,
            cancel: CancellationToken::new(),
            pollers: JoinSet::new(),
        }
    }

    /// Start a poll loop for `stream`. The first check runs immediately.
    pub fn spawn(&mut self, stream: StreamConfig) {
        self.pollers.spawn(poll(
            Arc::clone(&self.checker),
            stream,
            Arc::clone(&self.results),
            self.cancel.child_token(),
        ));
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    /// Cancel every poll loop and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.pollers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Poller exited abnormally");
            }
        }
    }
}

async fn poll(
    checker: Arc<StreamChecker>,
    stream: StreamConfig,
    results: Arc<DashMap<String, CheckResult>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(stream.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        stream = %stream.name,
        interval_ms = stream.interval.as_millis() as u64,
        mode = %stream.check_mode,
        "Poller started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = checker.check(stream.timeout, &stream) => match outcome {
                Ok(result) => result,
                Err(failure) => failure.into_result(),
            },
        };
        results.insert(stream.name.clone(), result);
    }

    tracing::debug!(stream = %stream.name, "Poller stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use exporter_core::{
        CheckerConfig, ErrorType, FetchError, MetricsRegistry, PlaylistFetcher, PlaylistResponse,
        SegmentFetcher, SegmentResponse,
    };

    use super::*;

    struct Unreachable;

    #[async_trait]
    impl PlaylistFetcher for Unreachable {
        async fn fetch_playlist(&self, url: &str) -> Result<PlaylistResponse, FetchError> {
            Err(FetchError::Network {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        }
    }

    #[async_trait]
    impl SegmentFetcher for Unreachable {
        async fn fetch_segment(&self, url: &str, _: bool) -> Result<SegmentResponse, FetchError> {
            Err(FetchError::Network {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        }
    }

    fn scheduler() -> (Scheduler, Arc<DashMap<String, CheckResult>>) {
        let checker = StreamChecker::new(
            Arc::new(Unreachable),
            Arc::new(MetricsRegistry::new()),
            CheckerConfig::default(),
        );
        let results = Arc::new(DashMap::new());
        (Scheduler::new(Arc::new(checker), Arc::clone(&results)), results)
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_runs_immediately_and_stores_failures() {
        let (mut scheduler, results) = scheduler();
        scheduler.spawn(
            StreamConfig::new("news", "https://example.com/master.m3u8")
                .with_interval(Duration::from_secs(60))
                .with_timeout(Duration::from_secs(5)),
        );
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = results.get("news").map(|r| r.value().clone()).unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error.unwrap().error_type,
            ErrorType::PlaylistDownload
        );

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn each_tick_replaces_the_previous_result() {
        let (mut scheduler, results) = scheduler();
        scheduler.spawn(
            StreamConfig::new("news", "https://example.com/master.m3u8")
                .with_interval(Duration::from_secs(10))
                .with_timeout(Duration::from_secs(5)),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = results.get("news").map(|r| r.id).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = results.get("news").map(|r| r.id).unwrap();
        assert_ne!(first, second);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_pollers() {
        let (mut scheduler, results) = scheduler();
        for name in ["a", "b", "c"] {
            scheduler.spawn(
                StreamConfig::new(name, "https://example.com/master.m3u8")
                    .with_interval(Duration::from_secs(10))
                    .with_timeout(Duration::from_secs(5)),
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(results.len(), 3);

        scheduler.shutdown().await;
    }
}
