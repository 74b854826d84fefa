pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioChunk, AudioFile, AudioInput, CaptureConfig, ChannelLevels, DiarizerConfig, InputProbe,
    InputSource, SpeakerDiarizer, SpeakerMode, WavContainerWriter, WavFormat,
};
pub use config::Config;
pub use error::{SessionError, SessionResult, TransportError};
pub use http::{create_router, AppState};
pub use protocol::{
    ClientMessage, Command, ConnectionState, ConnectionStatus, Connector, ServerMessage,
    SessionParams, StreamingClient, WsConnector,
};
pub use session::{
    FinishedRecording, RecordingMetadata, RecordingState, SessionConfig, SessionController,
    SessionSnapshot, SessionWatch, StartRequest,
};
