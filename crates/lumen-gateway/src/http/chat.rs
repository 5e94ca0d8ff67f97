//! Streaming chat endpoint - POST /chat
//!
//! The only streaming surface. Emits `text/event-stream` with one
//! `data: <JSON>` frame per pipeline event; response buffering is
//! disabled so chunks reach the client as they are produced.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use lumen_chat::{stream_chat, ChatTurnRequest};

use crate::app::AppState;
use crate::auth::authenticate;
use crate::http::error_body;

/// Message length bounds enforced at validation.
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub personality_name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> Result<
    Sse<impl Stream<Item = Result<Event, Infallible>>>,
    (StatusCode, Json<serde_json::Value>),
> {
    let user = authenticate(&state, &headers)?;

    // ── Validation ───────────────────────────────────────────────────────────
    let char_count = body.message.chars().count();
    if body.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, error_body("message cannot be empty")));
    }
    if char_count > MAX_MESSAGE_CHARS {
        return Err((
            StatusCode::BAD_REQUEST,
            error_body("message exceeds the 4000 character limit"),
        ));
    }

    // ── Ownership ────────────────────────────────────────────────────────────
    // A conversation that belongs to someone else reads as absent - do not
    // confirm its existence.
    if let Some(conversation_id) = body.conversation_id {
        match state.ctx.vector_store.conversation_scope(conversation_id) {
            Ok(Some((owner, _))) if owner != user.id => {
                return Err((StatusCode::NOT_FOUND, error_body("Conversation not found")));
            }
            Ok(_) => {}
            Err(_) => {
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("An unexpected error occurred. Please try again."),
                ));
            }
        }
    }

    let rx = stream_chat(
        Arc::clone(&state.ctx),
        user,
        ChatTurnRequest {
            message: body.message,
            conversation_id: body.conversation_id,
            personality_name: body.personality_name,
            system_prompt: body.system_prompt,
        },
    );

    let stream = ReceiverStream::new(rx).map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(payload))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
