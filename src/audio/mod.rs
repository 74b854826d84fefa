pub mod backend;
pub mod chunk;
pub mod diarizer;
pub mod file;
pub mod input;
pub mod store;
pub mod wav;

pub use backend::{open_first_available, AudioInput, CaptureConfig, InputProbe};
pub use chunk::{channel_levels, AudioChunk, ChannelLevels};
pub use diarizer::{DiarizerConfig, SpeakerDiarizer, SpeakerMode};
pub use file::AudioFile;
pub use input::{FileInput, InputSource};
pub use store::{AudioStore, SegmentCut, SegmentReason};
pub use wav::{WavContainerWriter, WavFormat, WavSummary, WAV_HEADER_LEN};
