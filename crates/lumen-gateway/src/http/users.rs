//! Per-user management endpoints: conversations, communication
//! preferences, emotion history, relationship state.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use lumen_analyzers::preference::CommunicationPreferences;

use crate::app::AppState;
use crate::auth::authenticate;
use crate::http::error_body;

type Rejection = (StatusCode, Json<serde_json::Value>);

fn internal<E: std::fmt::Display>(e: E) -> Rejection {
    warn!(error = %e, "user endpoint failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("An unexpected error occurred. Please try again."),
    )
}

pub async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let conversations = state
        .ctx
        .vector_store
        .list_conversations(user.id, 100)
        .map_err(internal)?;

    let rows: Vec<serde_json::Value> = conversations
        .into_iter()
        .map(|(id, personality_id, title, updated_at)| {
            serde_json::json!({
                "id": id,
                "personality_id": personality_id,
                "title": title,
                "updated_at": updated_at,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "conversations": rows })))
}

pub async fn get_preferences_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CommunicationPreferences>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let prefs = state.ctx.prefs.get(user.id).map_err(internal)?;
    Ok(Json(prefs))
}

pub async fn update_preferences_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CommunicationPreferences>,
) -> Result<Json<CommunicationPreferences>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let mut stored = state.ctx.prefs.get(user.id).map_err(internal)?;
    stored.merge_from(&body);
    state.ctx.prefs.put(user.id, &stored).map_err(internal)?;
    Ok(Json(stored))
}

pub async fn clear_preferences_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, Rejection> {
    let user = authenticate(&state, &headers)?;
    state.ctx.prefs.clear(user.id).map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn emotion_history_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let history = state
        .ctx
        .emotions
        .history(user.id, query.limit.min(500))
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "emotions": history })))
}

pub async fn emotion_statistics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let statistics = state.ctx.emotions.statistics(user.id).map_err(internal)?;
    Ok(Json(serde_json::json!({ "statistics": statistics })))
}

#[derive(Deserialize)]
pub struct TrendsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

pub async fn emotion_trends_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let trend = state
        .ctx
        .emotions
        .trends(user.id, query.days.clamp(1, 365))
        .map_err(internal)?;
    Ok(Json(serde_json::to_value(trend).unwrap_or_default()))
}

pub async fn clear_emotions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let removed = state.ctx.emotions.clear(user.id).map_err(internal)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

#[derive(Deserialize)]
pub struct RelationshipQuery {
    #[serde(default)]
    pub personality_name: Option<String>,
}

pub async fn relationship_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RelationshipQuery>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let personality = state
        .ctx
        .personalities
        .resolve(user.id, query.personality_name.as_deref())
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, error_body("Personality not found")))?;
    let relationship = state
        .ctx
        .relationships
        .get(user.id, personality.id)
        .map_err(internal)?;
    Ok(Json(serde_json::to_value(relationship).unwrap_or_default()))
}
