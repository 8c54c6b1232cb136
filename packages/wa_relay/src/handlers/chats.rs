use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::AppState;
use crate::error::RelayError;
use crate::models::{ChatFilter, ChatSummary};

/// Chat listings are scoped to the connected owner; with no session they are empty.
async fn list_filtered(
    state: &AppState,
    filter: ChatFilter,
) -> Result<Json<Vec<ChatSummary>>, RelayError> {
    let owner = state.session.owner().await;
    let chats = state.ledger.list_chats(owner.as_deref(), filter).await?;
    Ok(Json(chats))
}

pub async fn list_chats(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    list_filtered(&state, ChatFilter::All).await
}

pub async fn list_unread_chats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RelayError> {
    list_filtered(&state, ChatFilter::Unread).await
}

pub async fn list_group_chats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RelayError> {
    list_filtered(&state, ChatFilter::Groups).await
}

pub async fn list_business_chats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RelayError> {
    list_filtered(&state, ChatFilter::Business).await
}

/// Zero a chat's unread counter. `chat` is null when the chat does not exist.
pub async fn mark_chat_read(
    State(state): State<AppState>,
    Path(jid): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let owner = state.session.owner().await;
    let chat = state.ledger.mark_read(owner.as_deref(), &jid).await?;
    Ok(Json(serde_json::json!({ "success": true, "chat": chat })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(jid): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let owner = state.session.owner().await;
    let messages = state.ledger.list_messages(owner.as_deref(), &jid).await?;
    Ok(Json(messages))
}
