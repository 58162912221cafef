//! HTTP surface for the browser extension.

pub mod analyze;
pub mod health;


use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::error::StylistError;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/analyze-and-style", post(analyze::analyze_and_style))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error returned by handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(status = %self.status, "Request failed: {err:#}");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<StylistError> for AppError {
    fn from(err: StylistError) -> Self {
        let status = match &err {
            StylistError::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
            StylistError::UserNotFound(_) | StylistError::EmptyWardrobe(_) => {
                StatusCode::NOT_FOUND
            }
            StylistError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            StylistError::MalformedOutput(_)
            | StylistError::Store(_)
            | StylistError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = err.to_string();
        let internal = status.is_server_error().then(|| anyhow::Error::new(err));
        Self {
            status,
            message,
            internal,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: rejection.body_text(),
            internal: None,
        }
    }
}
