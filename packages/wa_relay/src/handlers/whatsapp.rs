use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::RelayError;
use crate::export;

pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.status().await)
}

/// Current pairing code as a data URL, or 404 when none is pending
pub async fn get_qr(State(state): State<AppState>) -> Response {
    match state.session.pairing_artifact().await {
        Some(qr) => Json(serde_json::json!({ "qr": qr })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "message": "QR not available" })),
        )
            .into_response(),
    }
}

pub async fn check_number(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let check = state.adapter.check_number(&number).await?;
    Ok(Json(check))
}

/// Missing fields deserialize as empty so they fail validation with a 400
#[derive(Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    number: String,
    #[serde(default)]
    message: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, RelayError> {
    if req.number.trim().is_empty() || req.message.trim().is_empty() {
        return Err(RelayError::Validation(
            "number and message required".to_string(),
        ));
    }
    let record = state.adapter.send_message(&req.number, &req.message).await?;
    Ok(Json(serde_json::json!({ "success": true, "message": record })))
}

pub async fn logout_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.adapter.logout().await;
    Json(serde_json::json!({ "success": true }))
}

/// Restart the engine supervisor so a fresh pairing code is issued after a logout
pub async fn connect_handler(State(state): State<AppState>) -> impl IntoResponse {
    let started = state.adapter.start().await;
    if started {
        info!("Engine supervisor restarted on request");
    }
    Json(serde_json::json!({ "success": true, "started": started }))
}

/// Download a conversation as a plain-text transcript
pub async fn export_chat(
    State(state): State<AppState>,
    Path(jid): Path<String>,
) -> Result<Response, RelayError> {
    let owner = state.session.owner().await;
    let messages = state.ledger.list_messages(owner.as_deref(), &jid).await?;
    let body = export::render_transcript(&jid, &messages);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::transcript_filename(&jid)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
