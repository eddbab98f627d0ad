//! REST API and SSE event stream
//!
//! Routes:
//! - `GET /health`, `GET /sounds`, `GET /events` (SSE)
//! - `POST /sounds/:sound_id/{play,stop,pause,resume,volume,fade}`
//! - `POST /engine/{start,stop,master,fade_out_all}`
//! - `GET /safety`, `POST /safety/{ceiling,enabled,session/start,session/end}`

pub mod handlers;
pub mod sse;

use crate::playback::MixerEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<MixerEngine>,
    pub port: u16,
}

/// Build the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Voices
        .route("/sounds", get(handlers::list_sounds))
        .route("/sounds/:sound_id/play", post(handlers::play_sound))
        .route("/sounds/:sound_id/stop", post(handlers::stop_sound))
        .route("/sounds/:sound_id/pause", post(handlers::pause_sound))
        .route("/sounds/:sound_id/resume", post(handlers::resume_sound))
        .route("/sounds/:sound_id/volume", post(handlers::set_volume))
        .route("/sounds/:sound_id/fade", post(handlers::fade_sound))
        // Engine
        .route("/engine/start", post(handlers::start_engine))
        .route("/engine/stop", post(handlers::stop_engine))
        .route("/engine/master", post(handlers::set_master_gain))
        .route("/engine/fade_out_all", post(handlers::fade_out_all))
        // Safety
        .route("/safety", get(handlers::get_safety))
        .route("/safety/ceiling", post(handlers::set_ceiling))
        .route("/safety/enabled", post(handlers::set_safety_enabled))
        .route("/safety/session/start", post(handlers::start_session))
        .route("/safety/session/end", post(handlers::end_session))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}
