use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::SessionError;

/// Capture format requested from an input device
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz (16kHz in the reference deployment)
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = near/far stereo pair)
    pub channels: u16,
    /// Duration of one fixed-size chunk in milliseconds
    pub chunk_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 2,
            chunk_duration_ms: 100,
        }
    }
}

impl CaptureConfig {
    /// Interleaved samples in one chunk (frames * channels)
    pub fn chunk_samples(&self) -> usize {
        let frames = (self.sample_rate as u64 * self.chunk_duration_ms / 1000) as usize;
        frames.max(1) * self.channels.max(1) as usize
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms.max(1))
    }
}

/// An opened capture device.
///
/// The handle is owned by exactly one capture loop for the lifetime of a
/// session. `read` is synchronous: it blocks for at most roughly one chunk
/// period and returns `Ok(0)` when no samples are available, including
/// after `stop()` once any buffered tail has been drained.
pub trait AudioInput: Send {
    /// Begin (or resume) delivering samples
    fn start(&mut self) -> Result<()>;

    /// Stop delivering new samples; already buffered samples stay readable
    fn stop(&mut self) -> Result<()>;

    /// Read interleaved i16 samples into `buf`, returning how many were written
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;

    fn channels(&self) -> u16;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// A capability probe for one candidate input source.
pub trait InputProbe: Send + Sync {
    fn label(&self) -> String;

    fn try_open(&self, config: &CaptureConfig) -> Result<Box<dyn AudioInput>>;
}

/// Open and start the first input source that initialises, in priority
/// order. A source that opens but refuses to start counts as unavailable.
///
/// Returns the running device together with the label of the probe that
/// produced it.
pub fn open_first_available(
    probes: &[Arc<dyn InputProbe>],
    config: &CaptureConfig,
) -> Result<(Box<dyn AudioInput>, String), SessionError> {
    let mut tried = Vec::with_capacity(probes.len());

    for probe in probes {
        let label = probe.label();
        info!("Trying audio input source: {}", label);

        let started = probe.try_open(config).and_then(|mut input| {
            input.start()?;
            Ok(input)
        });

        match started {
            Ok(input) => {
                info!(
                    "Opened audio input {} ({}Hz, {} channels)",
                    input.name(),
                    config.sample_rate,
                    input.channels()
                );
                return Ok((input, label));
            }
            Err(e) => {
                warn!("Audio input source {} unavailable: {:#}", label, e);
                tried.push(label);
            }
        }
    }

    Err(SessionError::DeviceUnavailable { tried })
}
