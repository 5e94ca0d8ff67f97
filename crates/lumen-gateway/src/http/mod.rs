pub mod chat;
pub mod goals;
pub mod health;
pub mod personalities;
pub mod tokens;
pub mod users;
pub mod verify;

use axum::Json;

/// User-visible error payloads are short generic sentences - never stack
/// traces or raw provider errors.
pub fn error_body(message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message }))
}
