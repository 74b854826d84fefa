//! WAV container serialisation for captured PCM buffers.
//!
//! Produces a 44-byte canonical header (RIFF/WAVE, 16-byte `fmt ` chunk,
//! PCM, 16 bits per sample) followed by the concatenated samples. The RIFF
//! and `data` sizes are derived from the true payload length. Output is a
//! pure function of the input buffers and format.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::chunk::AudioChunk;

/// Size of the canonical PCM header
pub const WAV_HEADER_LEN: usize = 44;

/// Channel count and rate of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    fn spec(&self) -> Result<hound::WavSpec> {
        if !(1..=2).contains(&self.channels) {
            bail!("unsupported channel count {} (expected 1 or 2)", self.channels);
        }
        if self.sample_rate == 0 {
            bail!("sample rate must be positive");
        }

        Ok(hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        })
    }
}

/// Summary of one written container
#[derive(Debug, Clone)]
pub struct WavSummary {
    pub path: PathBuf,
    pub format: WavFormat,
    /// Interleaved samples written (all channels)
    pub sample_count: usize,
    pub data_bytes: u32,
}

/// Serialises sequences of equal-format PCM buffers into WAV containers
pub struct WavContainerWriter {
    format: WavFormat,
}

impl WavContainerWriter {
    pub fn new(format: WavFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WavFormat {
        self.format
    }

    /// Encode the buffers into an in-memory WAV byte stream
    pub fn encode<'a, I>(&self, buffers: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = &'a [i16]>,
    {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor, buffers)?;
        Ok(cursor.into_inner())
    }

    /// Encode chunks captured in this session's format
    pub fn encode_chunks(&self, chunks: &[AudioChunk]) -> Result<Vec<u8>> {
        self.check_chunks(chunks)?;
        self.encode(chunks.iter().map(|c| &c.samples[..]))
    }

    /// Write chunks to `path`, replacing any existing file
    pub fn write_file(&self, path: impl AsRef<Path>, chunks: &[AudioChunk]) -> Result<WavSummary> {
        let path = path.as_ref();
        self.check_chunks(chunks)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
        let mut writer = BufWriter::new(file);
        let sample_count = self.write_to(&mut writer, chunks.iter().map(|c| &c.samples[..]))?;
        writer.flush().context("Failed to flush WAV file")?;

        let summary = WavSummary {
            path: path.to_path_buf(),
            format: self.format,
            sample_count,
            data_bytes: (sample_count * 2) as u32,
        };

        info!(
            "WAV written: {} ({} chunks, {} samples, {} bytes of audio)",
            path.display(),
            chunks.len(),
            summary.sample_count,
            summary.data_bytes
        );

        Ok(summary)
    }

    fn write_to<'a, W, I>(&self, sink: &mut W, buffers: I) -> Result<usize>
    where
        W: Write + Seek,
        I: IntoIterator<Item = &'a [i16]>,
    {
        let spec = self.format.spec()?;
        let mut writer =
            hound::WavWriter::new(sink, spec).context("Failed to write WAV header")?;
        let mut written = 0usize;

        for buffer in buffers {
            for &sample in buffer {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            written += buffer.len();
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        Ok(written)
    }

    fn check_chunks(&self, chunks: &[AudioChunk]) -> Result<()> {
        for chunk in chunks {
            if chunk.channels != self.format.channels || chunk.sample_rate != self.format.sample_rate
            {
                bail!(
                    "chunk {} format {}ch/{}Hz does not match container {}ch/{}Hz",
                    chunk.sequence,
                    chunk.channels,
                    chunk.sample_rate,
                    self.format.channels,
                    self.format.sample_rate
                );
            }
        }
        Ok(())
    }
}
