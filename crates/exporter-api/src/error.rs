use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    /// No check result has been stored for this stream name.
    UnknownStream(String),
    NoRoute(Uri),
    /// The metrics exposition could not be written.
    Render(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            Self::UnknownStream(name) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("No check result for stream '{}'", name),
            ),
            Self::NoRoute(uri) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("No route for {}", uri.path()),
            ),
            Self::Render(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                format!("Failed to render metrics: {}", reason),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(%message, "Request failed");
        }
        (status, axum::Json(ErrorBody { error, message })).into_response()
    }
}
