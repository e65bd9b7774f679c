use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::BoxError;
use std::time::Duration;
use quartz_core::{ErrorClass, IndexError};

/// Request-boundary error: every failure on the request path ends up here
/// and becomes a response. Nothing on this path aborts the process.
#[derive(Debug)]
pub enum ApiError {
    Index(IndexError),
    /// The blocking worker panicked or was cancelled.
    Worker(String),
    /// The request outlived the router's timeout.
    Timeout(Duration),
    /// Any other error surfaced by a middleware layer.
    Layer(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(e) => write!(f, "{e}"),
            Self::Worker(msg) => write!(f, "worker_error: {msg}"),
            Self::Timeout(limit) => write!(f, "request timed out after {}ms", limit.as_millis()),
            Self::Layer(msg) => write!(f, "internal_error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Index(e) => match e.class() {
                ErrorClass::ClientInput => StatusCode::BAD_REQUEST,
                ErrorClass::Dependency | ErrorClass::Computation => StatusCode::BAD_GATEWAY,
                ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Worker(_) | Self::Layer(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Classify an error raised by the middleware stack.
    pub fn from_layer(err: BoxError, limit: Duration) -> Self {
        if err.is::<tower::timeout::error::Elapsed>() {
            Self::Timeout(limit)
        } else {
            Self::Layer(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %message, "rejected request");
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}
