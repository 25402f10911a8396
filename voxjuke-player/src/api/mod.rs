//! HTTP control API
//!
//! Guild-scoped playback commands, queue editing and an SSE event stream.

pub mod handlers;
pub mod sse;

use crate::session::SessionRegistry;
use axum::{
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/events", get(sse::event_stream))
                // Playback control
                .route("/guilds/:guild/play", post(handlers::play))
                .route("/guilds/:guild/pause", post(handlers::pause))
                .route("/guilds/:guild/resume", post(handlers::resume))
                .route("/guilds/:guild/skip", post(handlers::skip))
                .route("/guilds/:guild/seek", post(handlers::seek))
                .route("/guilds/:guild/loop", post(handlers::toggle_loop))
                .route("/guilds/:guild/leave", post(handlers::leave))
                .route("/guilds/:guild/now-playing", get(handlers::now_playing))
                // Queue management
                .route(
                    "/guilds/:guild/queue",
                    get(handlers::get_queue).delete(handlers::clear_queue),
                )
                .route("/guilds/:guild/queue/swap", post(handlers::swap))
                .route("/guilds/:guild/queue/skip-to", post(handlers::skip_to))
                .route("/guilds/:guild/queue/:index", delete(handlers::remove))
                // Volume
                .route(
                    "/guilds/:guild/volume",
                    get(handlers::get_volume).put(handlers::set_volume),
                ),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "voxjuke-player",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
