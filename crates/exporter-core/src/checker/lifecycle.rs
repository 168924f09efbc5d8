use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::MetricsSink;

use super::engine::StreamChecker;

/// Background worker pool state. Checks derive their cancellation token from
/// `token`, so stopping the pool also cancels them.
#[derive(Default)]
pub(crate) struct Lifecycle {
    token: CancellationToken,
    workers: JoinSet<()>,
    running: bool,
}

impl Lifecycle {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl StreamChecker {
    /// Spawn the worker pool. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            debug!("Checker already running");
            return;
        }

        let token = lifecycle.token.clone();
        for worker in 0..self.config.workers.max(1) {
            lifecycle.workers.spawn(heartbeat(
                worker,
                token.clone(),
                Arc::clone(&self.active),
                Arc::clone(&self.metrics),
                self.config.heartbeat_interval,
            ));
        }
        lifecycle.running = true;
        info!(workers = self.config.workers, "Checker started");
    }

    /// Cancel the workers and every in-flight check, then wait for the
    /// workers to exit. Safe to call repeatedly; the checker can be started
    /// again afterwards.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.running {
            return;
        }

        lifecycle.token.cancel();
        while lifecycle.workers.join_next().await.is_some() {}
        lifecycle.token = CancellationToken::new();
        lifecycle.running = false;
        self.metrics.set_active_checks(0);
        info!("Checker stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.running
    }

    /// Workers still alive. Zero once [`stop`](Self::stop) has returned.
    pub async fn worker_count(&self) -> usize {
        self.lifecycle.lock().await.workers.len()
    }
}

async fn heartbeat(
    worker: usize,
    token: CancellationToken,
    active: Arc<AtomicUsize>,
    metrics: Arc<dyn MetricsSink>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => metrics.set_active_checks(active.load(Ordering::Relaxed)),
        }
    }
    debug!(worker, "Checker worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckerConfig;
    use crate::loader::{FetchError, PlaylistFetcher, PlaylistResponse, SegmentFetcher, SegmentResponse};
    use crate::metrics::MetricsRegistry;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl PlaylistFetcher for Offline {
        async fn fetch_playlist(&self, url: &str) -> Result<PlaylistResponse, FetchError> {
            Err(FetchError::Network {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
    }

    #[async_trait]
    impl SegmentFetcher for Offline {
        async fn fetch_segment(&self, url: &str, _: bool) -> Result<SegmentResponse, FetchError> {
            Err(FetchError::Network {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
    }

    fn checker(workers: usize) -> StreamChecker {
        StreamChecker::new(
            Arc::new(Offline),
            Arc::new(MetricsRegistry::new()),
            CheckerConfig::default()
                .with_workers(workers)
                .with_heartbeat_interval(Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn start_spawns_fixed_pool_once() {
        let checker = checker(3);
        checker.start().await;
        checker.start().await;
        assert!(checker.is_running().await);
        assert_eq!(checker.worker_count().await, 3);
        checker.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_drains() {
        let checker = checker(2);
        checker.stop().await;
        checker.start().await;
        checker.stop().await;
        checker.stop().await;
        assert!(!checker.is_running().await);
        assert_eq!(checker.worker_count().await, 0);
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let checker = checker(2);
        checker.start().await;
        checker.stop().await;
        checker.start().await;
        assert!(checker.is_running().await);
        assert_eq!(checker.worker_count().await, 2);
        checker.stop().await;
    }
}
