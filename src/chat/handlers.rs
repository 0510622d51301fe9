use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use super::repo::Message;
use super::services;
use crate::{auth::jwt::AuthUser, state::AppState};

const MAX_CONTENT_LEN: usize = 4000;

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat/messages", post(send_message).get(list_messages))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: Message,
    pub reply: String,
    /// Stored assistant message; absent when `reply` is the fallback text.
    pub reply_message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessagesPage {
    pub page: i64,
    pub per_page: i64,
    pub messages: Vec<Message>,
}

#[instrument(skip(state, body))]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, (StatusCode, String)> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content is required".into()));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err((StatusCode::BAD_REQUEST, "content is too long".into()));
    }

    let out = services::reply(state.messages.as_ref(), state.chat.as_ref(), user_id, content)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "storing chat message failed");
            (StatusCode::SERVICE_UNAVAILABLE, "could not store message".to_string())
        })?;

    Ok(Json(SendMessageResponse {
        message: out.user_message,
        reply: out.content,
        reply_message: out.reply,
    }))
}

#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<PageQuery>,
) -> Result<Json<MessagesPage>, (StatusCode, String)> {
    let page = q.page.unwrap_or(1).max(1);
    let per_page = q.per_page.unwrap_or(20).clamp(1, 100);

    let messages = state
        .messages
        .page(user_id, page, per_page)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "listing chat messages failed");
            (StatusCode::SERVICE_UNAVAILABLE, "could not load messages".to_string())
        })?;

    Ok(Json(MessagesPage {
        page,
        per_page,
        messages,
    }))
}
