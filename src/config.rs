use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{CaptureConfig, DiarizerConfig, InputProbe, InputSource};
use crate::protocol::{ClientSettings, ProviderConfig};
use crate::session::SessionConfig;

/// Prefix for environment overrides, e.g. `VOXLINK__SERVER__USER_ID`
pub const ENV_PREFIX: &str = "VOXLINK";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub server: ServerConfig,
    pub languages: LanguageConfig,
    pub providers: ProvidersConfig,
    pub diarization: DiarizationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voxlink".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_duration_ms: u64,
    /// Tried in order until one opens
    pub input_sources: Vec<InputSource>,
    pub segment_on_speaker_switch: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            recordings_path: "recordings".to_string(),
            sample_rate: 16000,
            channels: 2,
            chunk_duration_ms: 100,
            input_sources: vec![InputSource::Default],
            segment_on_speaker_switch: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Candidate endpoints, primary first
    pub endpoints: Vec<String>,
    /// Generated per process when unset
    pub user_id: Option<String>,
    pub connect_timeout_secs: u64,
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["ws://localhost:8000/ws".to_string()],
            user_id: None,
            connect_timeout_secs: 10,
            outbound_queue: 256,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    pub source: String,
    pub target: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            source: "cs".to_string(),
            target: "en".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub llm: String,
    pub llm_api_key: String,
    pub transcription: String,
    pub transcription_api_key: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            llm: "ollama".to_string(),
            llm_api_key: String::new(),
            transcription: "local".to_string(),
            transcription_api_key: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiarizationConfig {
    pub window: usize,
    pub silence_threshold: f32,
    pub dominance_ratio: f32,
    pub cooldown_ms: u64,
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        let defaults = DiarizerConfig::default();
        Self {
            window: defaults.window,
            silence_threshold: defaults.silence_threshold,
            dominance_ratio: defaults.dominance_ratio,
            cooldown_ms: defaults.cooldown.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load `path` (extension optional) layered with `VOXLINK__…` variables
    pub fn load(path: &str) -> Result<Self> {
        Self::build(config::File::with_name(path))
    }

    /// Like [`load`](Self::load), but a missing file falls back to defaults
    pub fn load_optional(path: &str) -> Result<Self> {
        Self::build(config::File::with_name(path).required(false))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.endpoints")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            chunk_duration_ms: self.audio.chunk_duration_ms,
        }
    }

    pub fn diarizer_config(&self) -> DiarizerConfig {
        DiarizerConfig {
            window: self.diarization.window,
            silence_threshold: self.diarization.silence_threshold,
            dominance_ratio: self.diarization.dominance_ratio,
            cooldown: Duration::from_millis(self.diarization.cooldown_ms),
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            llm_provider: self.providers.llm.clone(),
            llm_api_key: self.providers.llm_api_key.clone(),
            transcription_provider: self.providers.transcription.clone(),
            transcription_api_key: self.providers.transcription_api_key.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();

        SessionConfig {
            capture: self.capture_config(),
            diarizer: self.diarizer_config(),
            endpoints: self.server.endpoints.clone(),
            client: ClientSettings {
                connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
                outbound_queue: self.server.outbound_queue,
            },
            user_id: self
                .server
                .user_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or(defaults.user_id),
            recordings_path: PathBuf::from(&self.audio.recordings_path),
            source_language: self.languages.source.clone(),
            target_language: self.languages.target.clone(),
            providers: self.provider_config(),
            segment_on_speaker_switch: self.audio.segment_on_speaker_switch,
            timer_interval: defaults.timer_interval,
        }
    }

    /// Input sources as probes, in configured order
    pub fn input_probes(&self) -> Vec<Arc<dyn InputProbe>> {
        self.audio
            .input_sources
            .iter()
            .cloned()
            .map(|source| Arc::new(source) as Arc<dyn InputProbe>)
            .collect()
    }
}
