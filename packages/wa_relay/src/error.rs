use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::error;

use wa_link::LinkError;

/// Failures surfaced by relay operations that reach the request layer
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("WhatsApp not connected")]
    NotConnected,

    #[error("{0}")]
    Validation(String),

    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Link(LinkError::ConnectionClosed) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Link(_) => StatusCode::BAD_GATEWAY,
            RelayError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
