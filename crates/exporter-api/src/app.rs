use axum::http::Uri;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::metrics::metrics_handler;
use crate::routes;
use crate::state::AppState;

/// Scrape and liveness endpoints live at configurable paths; the JSON
/// status API is always under `/api/v1`.
pub fn build_app(state: AppState) -> Router {
    let probes = Router::new()
        .route(&state.metrics_path, get(metrics_handler))
        .route(&state.health_path, get(|| async { "ok" }));

    Router::new()
        .nest("/api/v1", routes::router())
        .merge(probes)
        .fallback(|uri: Uri| async move { ApiError::NoRoute(uri) })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
