use std::sync::Arc;

/// One fixed-size capture buffer (16-bit PCM, interleaved)
///
/// Samples are copied out of the capture loop's reusable read buffer when
/// the chunk is created and never mutated afterwards, so the chunk can be
/// shared between the accumulation buffer, the diarizer and the network
/// sender without further copies.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonic per-session sequence number (starts at 0)
    pub sequence: u64,
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Arc<[i16]>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Recording time (pauses excluded) at which the chunk was read, in ms
    pub timestamp_ms: u64,
}

impl AudioChunk {
    pub fn new(
        sequence: u64,
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sequence,
            samples: Arc::from(samples),
            sample_rate,
            channels,
            timestamp_ms,
        }
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn levels(&self) -> ChannelLevels {
        channel_levels(&self.samples, self.channels)
    }

    /// Little-endian PCM bytes, as sent on the wire
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Mean absolute amplitude per channel, normalised to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelLevels {
    /// Near (self) microphone
    pub left: f32,
    /// Far (external) microphone
    pub right: f32,
}

impl ChannelLevels {
    /// Visualisation signal: the louder of the two channels
    pub fn peak(&self) -> f32 {
        self.left.max(self.right)
    }
}

/// Compute per-channel levels of an interleaved buffer.
///
/// Mono input reports the same level on both sides. Channels beyond the
/// first two are ignored. A trailing partial frame is skipped.
pub fn channel_levels(samples: &[i16], channels: u16) -> ChannelLevels {
    let channels = channels.max(1) as usize;
    let mut sum_left: u64 = 0;
    let mut sum_right: u64 = 0;
    let mut frames: u64 = 0;

    for frame in samples.chunks_exact(channels) {
        let left = (frame[0] as i32).unsigned_abs() as u64;
        let right = if channels > 1 {
            (frame[1] as i32).unsigned_abs() as u64
        } else {
            left
        };
        sum_left += left;
        sum_right += right;
        frames += 1;
    }

    if frames == 0 {
        return ChannelLevels::default();
    }

    let normalise = |sum: u64| ((sum as f64 / frames as f64) / i16::MAX as f64).min(1.0) as f32;

    ChannelLevels {
        left: normalise(sum_left),
        right: normalise(sum_right),
    }
}
