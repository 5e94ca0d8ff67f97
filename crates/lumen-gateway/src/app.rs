use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use lumen_chat::ChatContext;

use crate::rate_limit::RateLimiter;

/// Central shared state - passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub ctx: Arc<ChatContext>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(ctx: Arc<ChatContext>) -> Self {
        let rate_limiter =
            RateLimiter::new(ctx.config.auth.rate_limit_requests_per_minute);
        Self { ctx, rate_limiter }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.ctx.config.server.cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = state
            .ctx
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route(
            "/personalities",
            get(crate::http::personalities::list_handler)
                .post(crate::http::personalities::create_handler),
        )
        .route(
            "/personalities/{name}",
            get(crate::http::personalities::get_handler)
                .put(crate::http::personalities::update_handler)
                .delete(crate::http::personalities::delete_handler),
        )
        .route(
            "/conversations",
            get(crate::http::users::list_conversations_handler),
        )
        .route(
            "/preferences",
            get(crate::http::users::get_preferences_handler)
                .put(crate::http::users::update_preferences_handler)
                .delete(crate::http::users::clear_preferences_handler),
        )
        .route(
            "/emotions/history",
            get(crate::http::users::emotion_history_handler),
        )
        .route(
            "/emotions/statistics",
            get(crate::http::users::emotion_statistics_handler),
        )
        .route(
            "/emotions/trends",
            get(crate::http::users::emotion_trends_handler),
        )
        .route(
            "/emotions",
            delete(crate::http::users::clear_emotions_handler),
        )
        .route(
            "/relationship",
            get(crate::http::users::relationship_handler),
        )
        .route(
            "/goals",
            get(crate::http::goals::list_handler).post(crate::http::goals::create_handler),
        )
        .route(
            "/goals/analytics",
            get(crate::http::goals::analytics_handler),
        )
        .route(
            "/goals/{id}",
            delete(crate::http::goals::delete_handler),
        )
        .route(
            "/goals/{id}/status",
            put(crate::http::goals::status_handler),
        )
        .route(
            "/goals/{id}/progress",
            put(crate::http::goals::progress_handler),
        )
        .route(
            "/content/age-verify",
            post(crate::http::verify::age_verify_handler),
        )
        .route("/auth/token", post(crate::http::tokens::mint_handler))
        .route(
            "/auth/validate",
            post(crate::http::tokens::validate_handler),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
