//! HTTP request handlers
//!
//! Handlers are thin: they translate JSON to engine / safety calls and map
//! `Error` variants to status codes.

use crate::api::AppContext;
use crate::error::Error;
use crate::playback::VoiceSnapshot;
use crate::safety::SafetySnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dozy_common::FadeCurve;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    port: u16,
    engine_running: bool,
    active_voices: usize,
    blocks_rendered: u64,
    stream_errors: u32,
    output_failed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SoundsResponse {
    running: bool,
    master_gain: f32,
    max_voices: usize,
    voices: Vec<VoiceSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    gain: f32,
    #[serde(default = "default_looping")]
    looping: bool,
}

fn default_looping() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayResponse {
    pub sound_id: String,
    pub instance_id: Uuid,
    /// Gain actually applied after the safety clamp
    pub gain: f32,
}

#[derive(Debug, Deserialize)]
pub struct GainRequest {
    gain: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GainResponse {
    pub gain: f32,
}

#[derive(Debug, Deserialize)]
pub struct FadeRequest {
    to: f32,
    duration_ms: u64,
    #[serde(default)]
    curve: FadeCurve,
    #[serde(default)]
    stop_on_complete: bool,
}

#[derive(Debug, Deserialize)]
pub struct FadeOutAllRequest {
    duration_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FadeOutAllResponse {
    pub voices: usize,
}

#[derive(Debug, Deserialize)]
pub struct CeilingRequest {
    ceiling: f32,
}

#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    enabled: bool,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::AssetNotFound(_) | Error::VoiceNotFound(_) => StatusCode::NOT_FOUND,
        Error::EngineNotRunning => StatusCode::CONFLICT,
        Error::TooManyVoices { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::DecodeFailed { .. } | Error::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::AudioOutput(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: Error) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        error!("Request failed: {}", error);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", error),
        }),
    )
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let meter = ctx.engine.output_meter();
    let (blocks_rendered, stream_errors, output_failed) = meter
        .map(|m| (m.blocks_rendered(), m.error_count(), m.has_failed()))
        .unwrap_or((0, 0, false));

    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "dozy-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("DOZY_GIT_HASH").to_string(),
        build_timestamp: env!("DOZY_BUILD_TIMESTAMP").to_string(),
        port: ctx.port,
        engine_running: ctx.engine.is_running(),
        active_voices: ctx.engine.voice_count(),
        blocks_rendered,
        stream_errors,
        output_failed,
    })
}

// ============================================================================
// Voices
// ============================================================================

/// GET /sounds - active voices
pub async fn list_sounds(State(ctx): State<AppContext>) -> Json<SoundsResponse> {
    Json(SoundsResponse {
        running: ctx.engine.is_running(),
        master_gain: ctx.engine.master_gain(),
        max_voices: ctx.engine.config().max_voices,
        voices: ctx.engine.active_voices(),
    })
}

/// POST /sounds/:sound_id/play
pub async fn play_sound(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<String>,
    Json(req): Json<PlayRequest>,
) -> ApiResult<PlayResponse> {
    let instance_id = ctx
        .engine
        .play_sound(&sound_id, req.gain, req.looping)
        .await
        .map_err(api_error)?;
    let gain = ctx.engine.voice_gain(&sound_id).unwrap_or(0.0);

    Ok(Json(PlayResponse {
        sound_id,
        instance_id,
        gain,
    }))
}

/// POST /sounds/:sound_id/stop
pub async fn stop_sound(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine.stop_sound(&sound_id).map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /sounds/:sound_id/pause
pub async fn pause_sound(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine.pause_sound(&sound_id).map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /sounds/:sound_id/resume
pub async fn resume_sound(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine.resume_sound(&sound_id).map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /sounds/:sound_id/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<String>,
    Json(req): Json<GainRequest>,
) -> ApiResult<GainResponse> {
    let gain = ctx.engine.set_volume(&sound_id, req.gain).map_err(api_error)?;
    Ok(Json(GainResponse { gain }))
}

/// POST /sounds/:sound_id/fade
pub async fn fade_sound(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<String>,
    Json(req): Json<FadeRequest>,
) -> ApiResult<StatusResponse> {
    ctx.engine
        .fade_with_curve(
            &sound_id,
            req.to,
            Duration::from_millis(req.duration_ms),
            req.curve,
            req.stop_on_complete,
        )
        .map_err(api_error)?;
    Ok(StatusResponse::ok())
}

// ============================================================================
// Engine
// ============================================================================

/// POST /engine/start
pub async fn start_engine(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.engine.start().await.map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /engine/stop
pub async fn stop_engine(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.engine.stop().await.map_err(api_error)?;
    Ok(StatusResponse::ok())
}

/// POST /engine/master
pub async fn set_master_gain(
    State(ctx): State<AppContext>,
    Json(req): Json<GainRequest>,
) -> ApiResult<GainResponse> {
    let gain = ctx.engine.set_master_gain(req.gain).map_err(api_error)?;
    Ok(Json(GainResponse { gain }))
}

/// POST /engine/fade_out_all - sleep-timer wind-down
pub async fn fade_out_all(
    State(ctx): State<AppContext>,
    Json(req): Json<FadeOutAllRequest>,
) -> Json<FadeOutAllResponse> {
    let voices = ctx
        .engine
        .fade_out_all(Duration::from_millis(req.duration_ms));
    info!("Fade-out-all requested over {}ms", req.duration_ms);
    Json(FadeOutAllResponse { voices })
}

// ============================================================================
// Safety
// ============================================================================

/// GET /safety
pub async fn get_safety(State(ctx): State<AppContext>) -> Json<SafetySnapshot> {
    Json(ctx.engine.safety().snapshot())
}

/// POST /safety/ceiling - returns the state with the ceiling actually stored
pub async fn set_ceiling(
    State(ctx): State<AppContext>,
    Json(req): Json<CeilingRequest>,
) -> Json<SafetySnapshot> {
    let safety = ctx.engine.safety();
    safety.set_ceiling(req.ceiling);
    Json(safety.snapshot())
}

/// POST /safety/enabled
pub async fn set_safety_enabled(
    State(ctx): State<AppContext>,
    Json(req): Json<EnabledRequest>,
) -> Json<SafetySnapshot> {
    let safety = ctx.engine.safety();
    safety.set_enabled(req.enabled);
    Json(safety.snapshot())
}

/// POST /safety/session/start
pub async fn start_session(State(ctx): State<AppContext>) -> Json<SafetySnapshot> {
    let safety = ctx.engine.safety();
    safety.start_session();
    Json(safety.snapshot())
}

/// POST /safety/session/end
pub async fn end_session(State(ctx): State<AppContext>) -> Json<SafetySnapshot> {
    let safety = ctx.engine.safety();
    safety.end_session();
    Json(safety.snapshot())
}
