use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/session/start", post(handlers::start_session))
        .route("/session/pause", post(handlers::pause_session))
        .route("/session/resume", post(handlers::resume_session))
        .route("/session/stop", post(handlers::stop_session))
        // In-session controls
        .route("/session/swap", post(handlers::swap_languages))
        .route("/session/speaker", post(handlers::set_speaker))
        .route("/session/tts", post(handlers::request_tts))
        // Decision on the stopped recording
        .route("/session/save", post(handlers::save_session))
        .route("/session/discard", post(handlers::discard_session))
        // State views
        .route("/session/status", get(handlers::session_status))
        .route("/session/transcript", get(handlers::session_transcript))
        // Saved recordings
        .route("/recordings", get(handlers::list_recordings))
        .route(
            "/recordings/:id",
            get(handlers::get_recording).delete(handlers::delete_recording),
        )
        .route("/recordings/:id/audio", get(handlers::recording_audio))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
