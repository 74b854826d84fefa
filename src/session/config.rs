use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{CaptureConfig, DiarizerConfig};
use crate::protocol::{ClientSettings, ProviderConfig};

/// Configuration shared by every session a controller runs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capture format and chunk size
    pub capture: CaptureConfig,

    /// Speaker attribution tuning
    pub diarizer: DiarizerConfig,

    /// Server candidates, tried in order
    pub endpoints: Vec<String>,

    /// Streaming client timeouts and queue size
    pub client: ClientSettings,

    /// Stable identity sent with every session
    pub user_id: String,

    /// Where WAV files and metadata records are written
    pub recordings_path: PathBuf,

    /// Defaults used when a start request leaves them out
    pub source_language: String,
    pub target_language: String,
    pub providers: ProviderConfig,

    /// Cut a segment whenever the speaker mode switches
    pub segment_on_speaker_switch: bool,

    /// How often the elapsed-time cell is refreshed
    pub timer_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            diarizer: DiarizerConfig::default(),
            endpoints: Vec::new(),
            client: ClientSettings::default(),
            user_id: uuid::Uuid::new_v4().to_string(),
            recordings_path: PathBuf::from("recordings"),
            source_language: "cs".to_string(),
            target_language: "en".to_string(),
            providers: ProviderConfig {
                llm_provider: "ollama".to_string(),
                llm_api_key: String::new(),
                transcription_provider: "local".to_string(),
                transcription_api_key: String::new(),
            },
            segment_on_speaker_switch: false,
            timer_interval: Duration::from_millis(100),
        }
    }
}

/// Per-session overrides supplied at `start()`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub source_language: Option<String>,
    #[serde(default)]
    pub target_language: Option<String>,
    #[serde(default)]
    pub providers: Option<ProviderConfig>,
}

impl StartRequest {
    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }
}
