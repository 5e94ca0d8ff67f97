//! Personality management - non-streaming JSON CRUD.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use lumen_analyzers::personality::PersonalityDirective;
use lumen_personality::PersonalityError;

use crate::app::AppState;
use crate::auth::authenticate;
use crate::http::error_body;

type Rejection = (StatusCode, Json<serde_json::Value>);

#[derive(Deserialize)]
pub struct CreatePersonalityBody {
    pub name: String,
    #[serde(default)]
    pub archetype: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdatePersonalityBody {
    #[serde(default)]
    pub archetype: Option<String>,
    #[serde(default)]
    pub traits: std::collections::HashMap<String, u8>,
    #[serde(default)]
    pub behaviors: std::collections::HashMap<String, bool>,
    #[serde(default)]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let personalities = state
        .ctx
        .personalities
        .list(user.id)
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "personalities": personalities })))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePersonalityBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), Rejection> {
    let user = authenticate(&state, &headers)?;
    if body.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, error_body("name cannot be empty")));
    }

    let personality = state
        .ctx
        .personalities
        .create(
            user.id,
            body.name.trim(),
            body.archetype.as_deref(),
            body.backstory.as_deref(),
            body.custom_instructions.as_deref(),
        )
        .map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(personality).unwrap_or_default())))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let personality = state
        .ctx
        .personalities
        .resolve(user.id, Some(&name))
        .await
        .map_err(map_error)?;
    Ok(Json(serde_json::to_value(personality).unwrap_or_default()))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<UpdatePersonalityBody>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let directive = PersonalityDirective {
        archetype: body.archetype,
        relationship_type: body.relationship_type,
        traits: body.traits,
        behaviors: body.behaviors,
        custom_instructions: body.custom_instructions,
    };
    let updated = state
        .ctx
        .personalities
        .update(user.id, &name, &directive)
        .await
        .map_err(map_error)?;
    Ok(Json(serde_json::to_value(updated).unwrap_or_default()))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<StatusCode, Rejection> {
    let user = authenticate(&state, &headers)?;
    state
        .ctx
        .personalities
        .delete(user.id, &name)
        .await
        .map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn map_error(e: PersonalityError) -> Rejection {
    match e {
        PersonalityError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, error_body("Personality not found"))
        }
        PersonalityError::NameTaken { .. } => (
            StatusCode::CONFLICT,
            error_body("A personality with that name already exists"),
        ),
        PersonalityError::UnknownArchetype { .. } => {
            (StatusCode::BAD_REQUEST, error_body("Unknown archetype"))
        }
        other => internal(other),
    }
}

fn internal<E: std::fmt::Display>(e: E) -> Rejection {
    warn!(error = %e, "personality endpoint failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("An unexpected error occurred. Please try again."),
    )
}
