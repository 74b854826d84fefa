//! Error types for the recording session engine.
//!
//! Failures that have a documented fallback (input-source list, endpoint
//! list) are recovered internally and only surface here once the fallback
//! is exhausted. Malformed server messages and WAV write failures never
//! reach callers as errors: they are logged, and the latter is reported on
//! the finished recording.
//!
//! ```text
//! SessionError
//! ├── DeviceUnavailable   -- every input source failed to open
//! ├── AlreadyActive       -- start() while a session is running
//! ├── NotActive           -- stop()/swap/speaker/tts while idle
//! ├── NothingPending      -- save/discard without a finished recording
//! ├── RecordingNotFound   -- no saved recording with that id
//! ├── Transport(..)       -- connection errors surfaced to a caller
//! └── Io(..)              -- metadata / file housekeeping
//! ```

use thiserror::Error;

/// Errors returned by [`SessionController`](crate::session::SessionController).
#[derive(Error, Debug)]
pub enum SessionError {
    /// No audio input source could be opened.
    #[error("no audio input source could be opened (tried: {})", tried.join(", "))]
    DeviceUnavailable { tried: Vec<String> },

    #[error("a recording session is already active")]
    AlreadyActive,

    #[error("no recording session is active")]
    NotActive,

    #[error("no finished recording is awaiting a save/discard decision")]
    NothingPending,

    #[error("no saved recording with id '{0}'")]
    RecordingNotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the streaming protocol client.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no endpoints configured")]
    NoCandidates,

    /// A single candidate endpoint could not be reached.
    #[error("connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Every candidate endpoint failed during one `connect()` call.
    #[error("all {attempted} endpoints unavailable: {last}")]
    Exhausted { attempted: usize, last: String },

    #[error("connection closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;
