use std::time::{Duration, Instant};

/// Recording-time accounting with paused intervals excluded.
///
/// Every method takes the current instant explicitly; the controller passes
/// `Instant::now()`.
#[derive(Debug, Clone, Default)]
pub struct ElapsedClock {
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    stopped_at: Option<Instant>,
    total_paused: Duration,
}

impl ElapsedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now: Instant) {
        *self = Self {
            started_at: Some(now),
            ..Self::default()
        };
    }

    pub fn pause(&mut self, now: Instant) {
        if self.is_running() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.total_paused += now.saturating_duration_since(paused_at);
        }
    }

    /// Freeze the clock. A stop while paused closes the paused interval.
    pub fn stop(&mut self, now: Instant) {
        if self.started_at.is_none() || self.stopped_at.is_some() {
            return;
        }
        self.resume(now);
        self.stopped_at = Some(now);
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.paused_at.is_none() && self.stopped_at.is_none()
    }

    /// `end - start - total_paused`, where `end` is the stop instant, the
    /// start of the current pause, or `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.stopped_at.or(self.paused_at).unwrap_or(now);

        end.saturating_duration_since(started_at)
            .saturating_sub(self.total_paused)
    }

    pub fn total_paused(&self) -> Duration {
        self.total_paused
    }
}
