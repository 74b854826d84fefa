//! Two-channel speaker attribution.
//!
//! The near microphone (left channel) carries the user's own voice, the far
//! microphone (right channel) the other party. Per chunk the diarizer keeps a
//! short window of both channel levels and picks whichever side dominates
//! the window average by a fixed ratio. Silence and ambiguous windows keep
//! the current mode, and an applied switch (automatic or manual) starts a
//! cooldown during which no further automatic switch is applied.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

use super::chunk::ChannelLevels;

/// Who is currently speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpeakerMode {
    /// The device owner (near microphone)
    #[default]
    #[serde(rename = "self")]
    User,
    /// The other party (far microphone)
    #[serde(rename = "external")]
    External,
}

impl SpeakerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "self",
            Self::External => "external",
        }
    }
}

/// Tuning parameters; calibrated per device, not universal constants
#[derive(Debug, Clone)]
pub struct DiarizerConfig {
    /// Number of chunks averaged before any decision is made
    pub window: usize,
    /// Both averages below this level count as silence
    pub silence_threshold: f32,
    /// One side must exceed the other by this factor to win
    pub dominance_ratio: f32,
    /// Minimum time between applied switches
    pub cooldown: Duration,
}

impl Default for DiarizerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            silence_threshold: 0.02,
            dominance_ratio: 1.5,
            cooldown: Duration::from_millis(2000),
        }
    }
}

pub struct SpeakerDiarizer {
    config: DiarizerConfig,
    left: VecDeque<f32>,
    right: VecDeque<f32>,
    mode: SpeakerMode,
    last_switch: Option<Instant>,
}

impl SpeakerDiarizer {
    pub fn new(config: DiarizerConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config: DiarizerConfig { window, ..config },
            left: VecDeque::with_capacity(window),
            right: VecDeque::with_capacity(window),
            mode: SpeakerMode::default(),
            last_switch: None,
        }
    }

    pub fn mode(&self) -> SpeakerMode {
        self.mode
    }

    /// Window averages (left, right), once the window is full
    pub fn averages(&self) -> Option<(f32, f32)> {
        if self.left.len() < self.config.window {
            return None;
        }
        let n = self.left.len() as f32;
        Some((
            self.left.iter().sum::<f32>() / n,
            self.right.iter().sum::<f32>() / n,
        ))
    }

    /// Feed one chunk's levels. Returns the new mode when a switch was applied.
    pub fn observe(&mut self, levels: ChannelLevels, now: Instant) -> Option<SpeakerMode> {
        if self.left.len() == self.config.window {
            self.left.pop_front();
            self.right.pop_front();
        }
        self.left.push_back(levels.left);
        self.right.push_back(levels.right);

        let (avg_left, avg_right) = self.averages()?;

        if self.in_cooldown(now) {
            return None;
        }

        let candidate = self.classify(avg_left, avg_right);
        if candidate == self.mode {
            return None;
        }

        debug!(
            "Speaker mode {} -> {} (L: {:.3}, R: {:.3})",
            self.mode.as_str(),
            candidate.as_str(),
            avg_left,
            avg_right
        );
        self.mode = candidate;
        self.last_switch = Some(now);
        Some(candidate)
    }

    /// Manual override; restarts the cooldown as if a switch had just happened.
    ///
    /// Returns whether the mode actually changed.
    pub fn set_mode(&mut self, mode: SpeakerMode, now: Instant) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        self.last_switch = Some(now);
        changed
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        self.last_switch
            .map(|at| now.saturating_duration_since(at) < self.config.cooldown)
            .unwrap_or(false)
    }

    fn classify(&self, avg_left: f32, avg_right: f32) -> SpeakerMode {
        let threshold = self.config.silence_threshold;
        let ratio = self.config.dominance_ratio;

        if avg_left < threshold && avg_right < threshold {
            self.mode
        } else if avg_left > avg_right * ratio {
            SpeakerMode::User
        } else if avg_right > avg_left * ratio {
            SpeakerMode::External
        } else {
            self.mode
        }
    }
}
