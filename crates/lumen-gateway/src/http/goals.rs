//! Goal CRUD and analytics.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use lumen_analyzers::goal::DetectedGoal;
use lumen_users::types::GoalStatus;
use lumen_users::UserError;

use crate::app::AppState;
use crate::auth::authenticate;
use crate::http::error_body;

type Rejection = (StatusCode, Json<serde_json::Value>);

fn internal<E: std::fmt::Display>(e: E) -> Rejection {
    warn!(error = %e, "goal endpoint failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("An unexpected error occurred. Please try again."),
    )
}

fn map_error(e: UserError) -> Rejection {
    match e {
        UserError::GoalNotFound { .. } => (StatusCode::NOT_FOUND, error_body("Goal not found")),
        other => internal(other),
    }
}

/// Fetch a goal and confirm ownership; foreign goals read as absent.
fn owned_goal(
    state: &AppState,
    user_id: Uuid,
    goal_id: Uuid,
) -> Result<lumen_users::Goal, Rejection> {
    let goal = state
        .ctx
        .goals
        .get(goal_id)
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, error_body("Goal not found")))?;
    if goal.user_id != user_id {
        return Err((StatusCode::NOT_FOUND, error_body("Goal not found")));
    }
    Ok(goal)
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_completed: bool,
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Query(query): axum::extract::Query<ListQuery>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let goals = state
        .ctx
        .goals
        .list(user.id, query.include_completed)
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "goals": goals })))
}

#[derive(Deserialize)]
pub struct CreateGoalBody {
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub motivation: Option<String>,
}

fn default_category() -> String {
    "personal".to_string()
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateGoalBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), Rejection> {
    let user = authenticate(&state, &headers)?;
    if body.title.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, error_body("title cannot be empty")));
    }

    let detected = DetectedGoal {
        title: body.title.trim().to_string(),
        category: body.category,
        confidence: 1.0,
        motivation: body.motivation,
    };
    let goal = state.ctx.goals.create(user.id, &detected).map_err(internal)?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(goal).unwrap_or_default())))
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: GoalStatus,
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    owned_goal(&state, user.id, id)?;
    state.ctx.goals.set_status(id, body.status).map_err(map_error)?;
    let goal = state.ctx.goals.get(id).map_err(internal)?;
    Ok(Json(serde_json::to_value(goal).unwrap_or_default()))
}

#[derive(Deserialize)]
pub struct ProgressBody {
    pub progress: f32,
}

pub async fn progress_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ProgressBody>,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    owned_goal(&state, user.id, id)?;
    if !(0.0..=100.0).contains(&body.progress) {
        return Err((
            StatusCode::BAD_REQUEST,
            error_body("progress must be between 0 and 100"),
        ));
    }
    state.ctx.goals.set_progress(id, body.progress).map_err(map_error)?;
    let goal = state.ctx.goals.get(id).map_err(internal)?;
    Ok(Json(serde_json::to_value(goal).unwrap_or_default()))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Rejection> {
    let user = authenticate(&state, &headers)?;
    owned_goal(&state, user.id, id)?;
    state.ctx.goals.delete(id).map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn analytics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Rejection> {
    let user = authenticate(&state, &headers)?;
    let analytics = state.ctx.goals.analytics(user.id).map_err(internal)?;
    Ok(Json(analytics))
}
