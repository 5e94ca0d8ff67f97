//! Out-of-band age verification - POST /content/age-verify
//!
//! The only path that flips a session's verified flag. Chat text is never
//! parsed for confirmation.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::authenticate;
use crate::http::error_body;

#[derive(Deserialize)]
pub struct AgeVerifyBody {
    pub conversation_id: Uuid,
    /// The caller's explicit confirmation that they are 18 or older.
    pub confirmed: bool,
}

pub async fn age_verify_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AgeVerifyBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let user = authenticate(&state, &headers)?;

    if !body.confirmed {
        return Err((
            StatusCode::BAD_REQUEST,
            error_body("Verification requires explicit confirmation"),
        ));
    }

    // Sessions belong to the conversation's owner.
    let session = state
        .ctx
        .route_sessions
        .session(body.conversation_id, user.id);
    if session.user_id != user.id {
        return Err((StatusCode::NOT_FOUND, error_body("Conversation not found")));
    }

    state.ctx.route_sessions.verify_age(body.conversation_id);
    Ok(Json(serde_json::json!({
        "conversation_id": body.conversation_id,
        "age_verified": true,
    })))
}
