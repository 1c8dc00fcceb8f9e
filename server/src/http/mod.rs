use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::config::ServerConfig;
use crate::service::ESMSender;

pub mod api;
pub mod cache;
pub mod sse;
pub mod stream;

/// handlers reach every other service through its mailbox sender, the same
/// shape as the teacher's `HttpEndpoint`
#[derive(Clone)]
pub struct HttpState {
    pub config: Arc<ServerConfig>,
    pub db_tx: ESMSender,
    pub indexer_tx: ESMSender,
    pub thumbs_tx: ESMSender,
}

// copied from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs

// Make our own error that wraps `anyhow::Error`.
pub struct AppError(anyhow::Error);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal server error: {}", self.0),
        )
            .into_response()
    }
}
// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
