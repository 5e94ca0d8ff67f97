use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use lumen_core::types::User;

use crate::app::AppState;
use crate::http::error_body;

/// JWT claims: subject (external user id) and expiry are required.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub type AuthRejection = (StatusCode, Json<serde_json::Value>);

/// Resolve the caller to a first-class user, creating the row on first
/// contact. Identity sources, in order: Bearer JWT, X-API-Key, and (only
/// when authentication is disabled) the X-User-Id dev header.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AuthRejection> {
    let external_id = resolve_external_id(state, headers)?;

    state
        .rate_limiter
        .check(&external_id)
        .map_err(|_| (StatusCode::TOO_MANY_REQUESTS, error_body("Rate limit exceeded")))?;

    state
        .ctx
        .users
        .ensure_user(&external_id)
        .map_err(|_| internal_error())
}

fn resolve_external_id(state: &AppState, headers: &HeaderMap) -> Result<String, AuthRejection> {
    if let Some(token) = extract_bearer(headers) {
        let external_id = validate_jwt(state, token).ok_or_else(unauthorized)?;
        debug!(%external_id, "authenticated via JWT");
        return Ok(external_id);
    }

    if let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let external_id = validate_api_key(api_key).ok_or_else(unauthorized)?;
        debug!(%external_id, "authenticated via API key");
        return Ok(external_id);
    }

    if !state.ctx.config.auth.require_authentication {
        if let Some(user_id) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
            if !user_id.trim().is_empty() {
                debug!(external_id = user_id, "authenticated via dev header");
                return Ok(user_id.to_string());
            }
        }
    }

    Err(unauthorized())
}

fn unauthorized() -> AuthRejection {
    (
        StatusCode::UNAUTHORIZED,
        error_body("Authentication required. Provide a Bearer token or X-API-Key header."),
    )
}

fn internal_error() -> AuthRejection {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("An unexpected error occurred. Please try again."),
    )
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Validate an HS256 JWT and return its subject.
pub fn validate_jwt(state: &AppState, token: &str) -> Option<String> {
    let key = DecodingKey::from_secret(state.ctx.config.auth.jwt_secret.as_bytes());
    let validation = Validation::default();
    decode::<Claims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims.sub)
}

/// Mint a JWT for an external user id.
pub fn mint_jwt(state: &AppState, external_id: &str) -> Option<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: external_id.to_string(),
        exp: (now + chrono::Duration::hours(state.ctx.config.auth.jwt_expiration_hours)).timestamp(),
        iat: now.timestamp(),
    };
    let key = EncodingKey::from_secret(state.ctx.config.auth.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key).ok()
}

/// API keys look like `user_<id>_<random>`; the owner is the middle part.
pub fn validate_api_key(api_key: &str) -> Option<String> {
    let rest = api_key.strip_prefix("user_")?;
    let (id, random) = rest.rsplit_once('_')?;
    if id.is_empty() || random.len() < 8 {
        return None;
    }
    Some(id.to_string())
}

/// Generate a fresh API key for a user.
pub fn generate_api_key(external_id: &str) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("user_{external_id}_{random}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_roundtrip() {
        let key = generate_api_key("alice");
        assert_eq!(validate_api_key(&key).as_deref(), Some("alice"));
    }

    #[test]
    fn api_key_with_underscored_id() {
        let key = generate_api_key("alice_smith");
        assert_eq!(validate_api_key(&key).as_deref(), Some("alice_smith"));
    }

    #[test]
    fn malformed_api_keys_are_rejected(){
        assert!(validate_api_key("not-a-key").is_none());
        assert!(validate_api_key("user_").is_none());
        assert!(validate_api_key("user_alice_x").is_none());
    }
}
