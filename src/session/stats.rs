use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::{SegmentReason, SpeakerMode};
use crate::protocol::ConnectionStatus;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
        }
    }
}

/// A written segment file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub id: String,
    pub index: usize,
    pub path: PathBuf,

    /// "language_swap", "speaker_switch" or "end_of_session"
    pub reason: String,

    /// Languages the segment's audio was recorded under
    pub source_language: Option<String>,
    pub target_language: Option<String>,

    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub sample_count: usize,
}

impl SegmentInfo {
    pub fn reason_name(reason: &SegmentReason) -> &'static str {
        match reason {
            SegmentReason::LanguageSwap { .. } => "language_swap",
            SegmentReason::SpeakerSwitch => "speaker_switch",
            SegmentReason::EndOfSession => "end_of_session",
        }
    }
}

/// A stopped session awaiting a save or discard decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedRecording {
    pub id: String,
    pub user_id: String,

    /// Full-session WAV; `None` when writing it failed
    pub file_path: Option<PathBuf>,
    pub write_error: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Recording time with pauses excluded
    pub duration_ms: u64,

    /// Interleaved samples read from the device
    pub sample_count: u64,
    pub chunk_count: u64,

    pub source_language: String,
    pub target_language: String,
    pub original_text: String,
    pub translated_text: String,

    pub segments: Vec<SegmentInfo>,
}

/// Metadata record persisted by `save_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub name: String,
    pub file_path: Option<PathBuf>,
    pub duration_ms: u64,

    /// RFC 3339 start time
    pub timestamp: String,

    pub original_text: String,
    pub translated_text: String,
    pub target_language: String,
    pub user_id: String,
    pub segment_files: Vec<PathBuf>,
}

impl RecordingMetadata {
    pub fn from_recording(recording: &FinishedRecording, name: String) -> Self {
        Self {
            id: recording.id.clone(),
            name,
            file_path: recording.file_path.clone(),
            duration_ms: recording.duration_ms,
            timestamp: recording.started_at.to_rfc3339(),
            original_text: recording.original_text.clone(),
            translated_text: recording.translated_text.clone(),
            target_language: recording.target_language.clone(),
            user_id: recording.user_id.clone(),
            segment_files: recording.segments.iter().map(|s| s.path.clone()).collect(),
        }
    }
}

/// Latest `info` or `error` message, for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// "info" or "error"
    pub kind: String,
    pub message: String,
}

/// One consistent read of every observable value
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: RecordingState,
    pub elapsed_ms: u64,
    pub amplitude: f32,
    pub transcript: String,
    pub translation: String,
    pub connection: ConnectionStatus,
    pub speaker_mode: SpeakerMode,
    pub tts_audio: Option<String>,
    pub notice: Option<Notice>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub chunks_captured: u64,

    /// Id of a stopped recording that is neither saved nor discarded
    pub pending_recording: Option<String>,
}
