//! Observable state cells.
//!
//! Each cell is a `watch` channel with a single writer: the controller owns
//! the lifecycle state and elapsed time, the capture loop owns amplitude and
//! speaker mode, the message pump owns the text cells, and the streaming
//! client owns the connection status. Consumers only ever hold receivers.

use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::stats::{Notice, RecordingState};
use crate::audio::SpeakerMode;
use crate::protocol::{ConnectionStatus, ServerMessage};

pub(crate) struct StateCells {
    pub state: watch::Sender<RecordingState>,
    pub elapsed: watch::Sender<Duration>,
    pub amplitude: watch::Sender<f32>,
    pub transcript: watch::Sender<String>,
    pub translation: watch::Sender<String>,
    pub speaker_mode: watch::Sender<SpeakerMode>,
    pub tts_audio: watch::Sender<Option<String>>,
    pub notice: watch::Sender<Option<Notice>>,
}

impl StateCells {
    pub fn new() -> Self {
        Self {
            state: watch::channel(RecordingState::Idle).0,
            elapsed: watch::channel(Duration::ZERO).0,
            amplitude: watch::channel(0.0).0,
            transcript: watch::channel(String::new()).0,
            translation: watch::channel(String::new()).0,
            speaker_mode: watch::channel(SpeakerMode::default()).0,
            tts_audio: watch::channel(None).0,
            notice: watch::channel(None).0,
        }
    }

    /// Clear per-session values before a new session starts
    pub fn reset(&self) {
        self.elapsed.send_replace(Duration::ZERO);
        self.amplitude.send_replace(0.0);
        self.transcript.send_replace(String::new());
        self.translation.send_replace(String::new());
        self.speaker_mode.send_replace(SpeakerMode::default());
        self.tts_audio.send_replace(None);
        self.notice.send_replace(None);
    }

    pub fn watch(&self, connection: watch::Receiver<ConnectionStatus>) -> SessionWatch {
        SessionWatch {
            state: self.state.subscribe(),
            elapsed: self.elapsed.subscribe(),
            amplitude: self.amplitude.subscribe(),
            transcript: self.transcript.subscribe(),
            translation: self.translation.subscribe(),
            connection,
            speaker_mode: self.speaker_mode.subscribe(),
            tts_audio: self.tts_audio.subscribe(),
            notice: self.notice.subscribe(),
        }
    }

    /// Fold one server message into the text cells
    pub fn apply(&self, message: ServerMessage) {
        match message {
            ServerMessage::Transcription(text) => append_text(&self.transcript, &text),
            ServerMessage::Translation(text) => append_text(&self.translation, &text),
            ServerMessage::TtsAudio(audio) => {
                if !audio.is_empty() {
                    self.tts_audio.send_replace(Some(audio));
                }
            }
            ServerMessage::Error(message) => {
                warn!("Server error: {}", message);
                self.notice.send_replace(Some(Notice {
                    kind: "error".into(),
                    message,
                }));
            }
            ServerMessage::Info(message) => {
                info!("Server info: {}", message);
                self.notice.send_replace(Some(Notice {
                    kind: "info".into(),
                    message,
                }));
            }
        }
    }
}

/// Receivers for every observable value; clone freely
#[derive(Clone)]
pub struct SessionWatch {
    pub state: watch::Receiver<RecordingState>,
    pub elapsed: watch::Receiver<Duration>,
    pub amplitude: watch::Receiver<f32>,
    pub transcript: watch::Receiver<String>,
    pub translation: watch::Receiver<String>,
    pub connection: watch::Receiver<ConnectionStatus>,
    pub speaker_mode: watch::Receiver<SpeakerMode>,
    pub tts_audio: watch::Receiver<Option<String>>,
    pub notice: watch::Receiver<Option<Notice>>,
}

/// Append with a single space separator; empty text is ignored
fn append_text(cell: &watch::Sender<String>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    cell.send_modify(|current| {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(text);
    });
}

/// Forward server messages into the cells until the client goes away
pub(crate) async fn pump_server_messages(
    mut messages: broadcast::Receiver<ServerMessage>,
    cells: std::sync::Arc<StateCells>,
) {
    loop {
        match messages.recv().await {
            Ok(message) => cells.apply(message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Message pump lagged; {} server messages skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Message pump stopped");
}
