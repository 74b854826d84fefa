use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::input::conform;
use super::wav::WavFormat;

/// A decoded 16-bit PCM recording, used for file replay and for reading
/// back finished sessions
pub struct AudioFile {
    pub path: PathBuf,
    pub format: WavFormat,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;

        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "{}: only 16-bit integer PCM can be replayed, got {}-bit {:?}",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Corrupt sample data in {}", path.display()))?;

        let file = Self {
            path: path.to_path_buf(),
            format: WavFormat::new(spec.channels, spec.sample_rate),
            samples,
        };

        info!(
            "Loaded {}: {:.1}s at {}Hz/{}ch",
            path.display(),
            file.duration().as_secs_f64(),
            file.format.sample_rate,
            file.format.channels
        );

        Ok(file)
    }

    /// Sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        let rate = self.format.sample_rate.max(1) as u64;
        Duration::from_micros(self.frames() as u64 * 1_000_000 / rate)
    }

    /// Samples converted to `target`'s channel count and rate
    pub fn conformed(&self, target: WavFormat) -> Vec<i16> {
        conform(
            &self.samples,
            self.format.channels,
            self.format.sample_rate,
            target.channels,
            target.sample_rate,
        )
    }
}
