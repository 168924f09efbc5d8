use std::sync::Arc;

use dashmap::DashMap;

use exporter_core::{CheckResult, MetricsRegistry};

pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    /// Most recent result per stream name, written by the poller.
    pub results: Arc<DashMap<String, CheckResult>>,
    pub metrics_path: String,
    pub health_path: String,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            metrics,
            results: Arc::new(DashMap::new()),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }

    pub fn with_results(mut self, results: Arc<DashMap<String, CheckResult>>) -> Self {
        self.results = results;
        self
    }

    pub fn with_paths(mut self, metrics_path: impl Into<String>, health_path: impl Into<String>) -> Self {
        self.metrics_path = metrics_path.into();
        self.health_path = health_path.into();
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(MetricsRegistry::new()))
    }
}
