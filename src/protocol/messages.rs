use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider selection forwarded in the configuration handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub llm_provider: String,
    #[serde(default)]
    pub llm_api_key: String,
    pub transcription_provider: String,
    #[serde(default)]
    pub transcription_api_key: String,
}

/// Identity and settings of the session a connection belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub recording_id: String,
    pub user_id: String,
    pub source_language: String,
    pub target_language: String,
    pub providers: ProviderConfig,
}

/// Messages sent to the server, one JSON object per frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Config {
        user_id: String,
        recording_id: String,
        source_language: String,
        target_language: String,
        llm_provider: String,
        llm_api_key: String,
        transcription_provider: String,
        transcription_api_key: String,
        /// Epoch milliseconds
        timestamp: i64,
    },
    Audio {
        /// Base64-encoded little-endian 16-bit PCM
        data: String,
        recording_id: String,
        timestamp: i64,
        /// Capture sequence number. An addition to the server's audio
        /// schema, which ignores unknown fields.
        #[serde(default)]
        sequence: u64,
    },
    Pause {
        recording_id: String,
        user_id: String,
    },
    Resume {
        recording_id: String,
        user_id: String,
    },
    LanguageSwap {
        recording_id: String,
        user_id: String,
        source_language: String,
        target_language: String,
        segment_id: String,
    },
    Tts {
        text: String,
        voice: String,
        recording_id: String,
    },
    EndRecording {
        recording_id: String,
        user_id: String,
        name: String,
    },
}

impl ClientMessage {
    pub fn handshake(params: &SessionParams, timestamp: i64) -> Self {
        Self::Config {
            user_id: params.user_id.clone(),
            recording_id: params.recording_id.clone(),
            source_language: params.source_language.clone(),
            target_language: params.target_language.clone(),
            llm_provider: params.providers.llm_provider.clone(),
            llm_api_key: params.providers.llm_api_key.clone(),
            transcription_provider: params.providers.transcription_provider.clone(),
            transcription_api_key: params.providers.transcription_api_key.clone(),
            timestamp,
        }
    }

    /// Attach session identity to a control command
    pub fn from_command(command: Command, params: &SessionParams) -> Self {
        let recording_id = params.recording_id.clone();
        let user_id = params.user_id.clone();

        match command {
            Command::Pause => Self::Pause {
                recording_id,
                user_id,
            },
            Command::Resume => Self::Resume {
                recording_id,
                user_id,
            },
            Command::LanguageSwap {
                source_language,
                target_language,
                segment_id,
            } => Self::LanguageSwap {
                recording_id,
                user_id,
                source_language,
                target_language,
                segment_id,
            },
            Command::Tts { text, voice } => Self::Tts {
                text,
                voice,
                recording_id,
            },
            Command::EndRecording { name } => Self::EndRecording {
                recording_id,
                user_id,
                name,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Audio { .. } => "audio",
            Self::Pause { .. } => "pause",
            Self::Resume { .. } => "resume",
            Self::LanguageSwap { .. } => "language_swap",
            Self::Tts { .. } => "tts",
            Self::EndRecording { .. } => "end_recording",
        }
    }
}

/// Control commands, independent of the audio stream
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pause,
    Resume,
    LanguageSwap {
        source_language: String,
        target_language: String,
        segment_id: String,
    },
    Tts {
        text: String,
        voice: String,
    },
    EndRecording {
        name: String,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Transcription(String),
    Translation(String),
    /// Base64 audio to be played by the UI
    TtsAudio(String),
    Error(String),
    Info(String),
}

#[derive(Debug, Deserialize)]
struct RawServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

impl ServerMessage {
    /// Parse one frame.
    ///
    /// Returns `Ok(None)` for well-formed messages of an unknown type.
    pub fn parse(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        let msg: RawServerMessage = serde_json::from_str(raw)?;
        let data = msg.data.as_ref().map(value_text);
        let text = msg.text.as_ref().map(value_text);
        let message = msg.message.as_ref().map(value_text);
        let error = msg.error.as_ref().map(value_text);

        let parsed = match msg.kind.as_str() {
            "transcription" => Self::Transcription(data.unwrap_or_default()),
            "translation" => Self::Translation(data.or(text).unwrap_or_default()),
            "tts_audio" => Self::TtsAudio(data.unwrap_or_default()),
            "error" => Self::Error(
                error
                    .or(data)
                    .or(message)
                    .unwrap_or_else(|| "unknown server error".to_string()),
            ),
            "info" => Self::Info(data.or(message).unwrap_or_default()),
            _ => return Ok(None),
        };

        Ok(Some(parsed))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transcription(_) => "transcription",
            Self::Translation(_) => "translation",
            Self::TtsAudio(_) => "tts_audio",
            Self::Error(_) => "error",
            Self::Info(_) => "info",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Transcription(t)
            | Self::Translation(t)
            | Self::TtsAudio(t)
            | Self::Error(t)
            | Self::Info(t) => t,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Peek at the `type` field of a frame, for logging dropped messages
pub fn frame_type(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_text_field_fallback() {
        let msg = ServerMessage::parse(r#"{"type":"translation","text":"hello"}"#).unwrap();
        assert_eq!(msg, Some(ServerMessage::Translation("hello".into())));
    }

    #[test]
    fn test_error_prefers_error_field() {
        let msg =
            ServerMessage::parse(r#"{"type":"error","data":"x","error":"quota exceeded"}"#)
                .unwrap();
        assert_eq!(msg, Some(ServerMessage::Error("quota exceeded".into())));
    }

    #[test]
    fn test_structured_error_is_stringified() {
        let msg =
            ServerMessage::parse(r#"{"type":"error","error":{"code":429,"detail":"slow down"}}"#)
                .unwrap();
        match msg {
            Some(ServerMessage::Error(text)) => {
                assert!(text.contains("429"));
                assert!(text.contains("slow down"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_fallback_fields_are_kept() {
        let msg = ServerMessage::parse(r#"{"type":"info","message":42}"#).unwrap();
        assert_eq!(msg, Some(ServerMessage::Info("42".into())));
        let msg = ServerMessage::parse(r#"{"type":"translation","text":null}"#).unwrap();
        assert_eq!(msg, Some(ServerMessage::Translation(String::new())));
    }

    #[test]
    fn test_audio_frame_without_sequence_still_parses() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"audio","data":"AAA=","recording_id":"r1","timestamp":5}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Audio { sequence, .. } => assert_eq!(sequence, 0),
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        assert_eq!(ServerMessage::parse(r#"{"type":"heartbeat"}"#).unwrap(), None);
        assert_eq!(frame_type(r#"{"type":"heartbeat"}"#).as_deref(), Some("heartbeat"));
    }

    #[test]
    fn test_malformed_frame_is_parse_error() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"data":"no type"}"#).is_err());
    }
}
