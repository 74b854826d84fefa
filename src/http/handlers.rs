use super::state::AppState;
use crate::audio::SpeakerMode;
use crate::error::SessionError;
use crate::session::{FinishedRecording, StartRequest};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: String,
    pub recording: FinishedRecording,
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Serialize)]
pub struct SwapResponse {
    pub segment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeakerRequest {
    pub mode: SpeakerMode,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TtsResponse {
    pub sent: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: String,
    pub translation: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A `SessionError` rendered as an HTTP response
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            SessionError::DeviceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::RecordingNotFound(_) => StatusCode::NOT_FOUND,
            SessionError::AlreadyActive
            | SessionError::NotActive
            | SessionError::NothingPending => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn status(label: &str) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: label.to_string(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a new recording session; the body is optional
pub async fn start_session(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    let session_id = state.controller.start(request).await?;

    info!("Recording started for session: {}", session_id);

    Ok(Json(StartSessionResponse {
        session_id,
        status: "recording".to_string(),
    }))
}

/// POST /session/pause
/// Replies with the resulting state; pausing while idle changes nothing
pub async fn pause_session(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.controller.pause().await?;
    Ok(status(state.controller.state().as_str()))
}

/// POST /session/resume
pub async fn resume_session(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.controller.resume().await?;
    Ok(status(state.controller.state().as_str()))
}

/// POST /session/stop
/// Stop the session; the recording then awaits save or discard
pub async fn stop_session(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let recording = state.controller.stop().await?;
    Ok(Json(StopSessionResponse {
        status: "stopped".to_string(),
        recording,
    }))
}

/// POST /session/swap
pub async fn swap_languages(
    State(state): State<AppState>,
    Json(req): Json<SwapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let segment_id = state
        .controller
        .notify_language_swap(&req.source_language, &req.target_language)
        .await?;
    Ok(Json(SwapResponse { segment_id }))
}

/// POST /session/speaker
pub async fn set_speaker(
    State(state): State<AppState>,
    Json(req): Json<SpeakerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.controller.set_speaker_mode(req.mode).await?;
    Ok(status(req.mode.as_str()))
}

/// POST /session/tts
pub async fn request_tts(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = state.controller.request_tts(&req.text).await?;
    Ok(Json(TtsResponse { sent }))
}

/// POST /session/save
pub async fn save_session(
    State(state): State<AppState>,
    body: Option<Json<SaveRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    let metadata = state.controller.save_session(request.name).await?;
    Ok(Json(metadata))
}

/// POST /session/discard
pub async fn discard_session(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let recording = state.controller.discard_session().await?;
    info!("Recording {} discarded", recording.id);
    Ok(status("discarded"))
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.snapshot().await)
}

/// GET /session/transcript
pub async fn session_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let watch = state.controller.watch();
    let transcript = watch.transcript.borrow().clone();
    let translation = watch.translation.borrow().clone();
    Json(TranscriptResponse {
        transcript,
        translation,
    })
}

/// GET /recordings
/// Saved recordings, newest first
pub async fn list_recordings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let recordings = state.controller.library().list().await?;
    Ok(Json(recordings))
}

/// GET /recordings/:id
pub async fn get_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let metadata = state.controller.library().get(&id).await?;
    Ok(Json(metadata))
}

/// GET /recordings/:id/audio
/// The session WAV, for playback
pub async fn recording_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.controller.library().audio(&id).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes))
}

/// DELETE /recordings/:id
pub async fn delete_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let metadata = state.controller.library().delete(&id).await?;
    info!("Recording {} deleted", metadata.id);
    Ok(status("deleted"))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
