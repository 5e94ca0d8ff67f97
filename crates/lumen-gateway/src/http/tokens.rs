//! Token endpoints: mint a JWT / API key pair, validate a JWT.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::{generate_api_key, mint_jwt, validate_jwt};
use crate::http::error_body;

#[derive(Deserialize)]
pub struct MintBody {
    pub user_id: String,
}

pub async fn mint_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MintBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if body.user_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, error_body("user_id cannot be empty")));
    }

    let token = mint_jwt(&state, body.user_id.trim()).ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("An unexpected error occurred. Please try again."),
    ))?;

    Ok(Json(serde_json::json!({
        "token": token,
        "api_key": generate_api_key(body.user_id.trim()),
        "expires_in_hours": state.ctx.config.auth.jwt_expiration_hours,
    })))
}

#[derive(Deserialize)]
pub struct ValidateBody {
    pub token: String,
}

pub async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateBody>,
) -> Json<serde_json::Value> {
    match validate_jwt(&state, &body.token) {
        Some(subject) => Json(serde_json::json!({ "valid": true, "user_id": subject })),
        None => Json(serde_json::json!({ "valid": false })),
    }
}
