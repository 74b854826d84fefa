//! HTTP API server for external control (UI collaborators)
//!
//! This module provides a REST API over the session controller:
//! - POST /session/start, /pause, /resume, /stop - Lifecycle
//! - POST /session/swap, /speaker, /tts - In-session controls
//! - POST /session/save, /discard - Decide on the stopped recording
//! - GET /session/status, /transcript - Observable state
//! - GET /recordings, /recordings/:id, /recordings/:id/audio and
//!   DELETE /recordings/:id - Saved recordings
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ApiError;
pub use routes::create_router;
pub use state::AppState;
