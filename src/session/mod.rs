//! Recording session management
//!
//! This module provides the `SessionController`, which manages:
//! - Input device selection and the capture loop
//! - Per-chunk speaker attribution
//! - Streaming chunks and control commands to the translation server
//! - Transcript/translation collection and observable UI state
//! - Session and segment WAV files, and the save/discard decision
//! - The library of saved recordings

mod capture;
mod clock;
mod config;
mod controller;
mod library;
mod observe;
mod stats;

pub use clock::ElapsedClock;
pub use config::{SessionConfig, StartRequest};
pub use controller::{default_recording_name, SessionController};
pub use library::RecordingLibrary;
pub use observe::SessionWatch;
pub use stats::{
    FinishedRecording, Notice, RecordingMetadata, RecordingState, SegmentInfo, SessionSnapshot,
};
