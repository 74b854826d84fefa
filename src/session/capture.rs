//! The capture loop.
//!
//! Runs on a blocking thread for the whole session and is the only code
//! that touches the device. Control messages are polled between reads
//! while recording and awaited while paused, so a pause costs nothing and
//! `stop()` is always handled after the read in flight has completed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::observe::StateCells;
use crate::audio::{
    AudioChunk, AudioInput, AudioStore, CaptureConfig, SegmentReason, SpeakerDiarizer,
    SpeakerMode,
};
use crate::protocol::StreamingClient;

/// Upper bound on reads while draining a stopped device
const MAX_DRAIN_READS: usize = 1024;

#[derive(Debug)]
pub(crate) enum CaptureControl {
    Pause,
    Resume,
    SetSpeaker(SpeakerMode),
    Stop,
}

/// Returned when the loop exits; the device is handed back so the
/// controller releases it only after the loop has finished.
pub(crate) struct CaptureOutcome {
    pub device: Box<dyn AudioInput>,
    pub samples_read: u64,
    pub chunks: u64,
}

pub(crate) struct CaptureLoop {
    pub device: Box<dyn AudioInput>,
    pub config: CaptureConfig,
    pub diarizer: SpeakerDiarizer,
    pub store: Arc<Mutex<AudioStore>>,
    pub client: Arc<StreamingClient>,
    pub cells: Arc<StateCells>,
    pub control: mpsc::UnboundedReceiver<CaptureControl>,
    pub segment_on_speaker_switch: bool,
    pub chunks_captured: Arc<AtomicU64>,
}

impl CaptureLoop {
    pub fn run(mut self) -> CaptureOutcome {
        let channels = self.config.channels.max(1) as usize;
        let mut buffer = vec![0i16; self.config.chunk_samples()];
        let mut sequence: u64 = 0;
        let mut frames: u64 = 0;
        let mut samples_read: u64 = 0;
        let mut paused = false;

        info!("Capture loop started on {}", self.device.name());

        loop {
            let control = if paused {
                // Nothing to read; sleep until told otherwise
                Some(self.control.blocking_recv().unwrap_or(CaptureControl::Stop))
            } else {
                match self.control.try_recv() {
                    Ok(control) => Some(control),
                    Err(mpsc::error::TryRecvError::Empty) => None,
                    Err(mpsc::error::TryRecvError::Disconnected) => Some(CaptureControl::Stop),
                }
            };

            if let Some(control) = control {
                debug!("Capture control: {:?}", control);
                match control {
                    CaptureControl::Pause if !paused => {
                        if let Err(e) = self.device.stop() {
                            warn!("Failed to pause {}: {:#}", self.device.name(), e);
                        }
                        self.drain(&mut buffer, &mut sequence, &mut frames, &mut samples_read);
                        // Silent while paused, after any drained tail
                        self.cells.amplitude.send_replace(0.0);
                        paused = true;
                    }
                    CaptureControl::Resume if paused => {
                        if let Err(e) = self.device.start() {
                            error!("Failed to resume {}: {:#}", self.device.name(), e);
                        }
                        paused = false;
                    }
                    CaptureControl::Pause | CaptureControl::Resume => {}
                    CaptureControl::SetSpeaker(mode) => {
                        if self.diarizer.set_mode(mode, Instant::now()) {
                            self.cells.speaker_mode.send_replace(mode);
                            self.mark_speaker_boundary();
                        }
                    }
                    CaptureControl::Stop => {
                        if !paused {
                            if let Err(e) = self.device.stop() {
                                warn!("Failed to stop {}: {:#}", self.device.name(), e);
                            }
                            self.drain(&mut buffer, &mut sequence, &mut frames, &mut samples_read);
                        }
                        break;
                    }
                }
                continue;
            }

            let n = match self.device.read(&mut buffer) {
                Ok(n) => n,
                Err(e) => {
                    warn!("Device read failed: {:#}", e);
                    std::thread::sleep(self.config.chunk_duration());
                    0
                }
            };

            let whole = n - n % channels;
            if whole > 0 {
                self.process(&buffer[..whole], &mut sequence, &mut frames);
                samples_read += whole as u64;
            }
        }

        info!(
            "Capture loop stopped: {} chunks, {} samples",
            sequence, samples_read
        );

        CaptureOutcome {
            device: self.device,
            samples_read,
            chunks: sequence,
        }
    }

    /// Per-chunk hot path: store, attribute, transmit, visualise
    fn process(&mut self, samples: &[i16], sequence: &mut u64, frames: &mut u64) {
        let rate = self.config.sample_rate.max(1) as u64;
        let chunk = AudioChunk::new(
            *sequence,
            samples,
            self.config.sample_rate,
            self.config.channels,
            *frames * 1000 / rate,
        );
        *sequence += 1;
        *frames += chunk.frames() as u64;
        self.chunks_captured.store(*sequence, Ordering::Relaxed);

        let levels = chunk.levels();

        match self.store.lock() {
            Ok(mut store) => store.push(chunk.clone()),
            Err(poisoned) => poisoned.into_inner().push(chunk.clone()),
        }

        if let Some(mode) = self.diarizer.observe(levels, Instant::now()) {
            self.cells.speaker_mode.send_replace(mode);
            self.mark_speaker_boundary();
        }

        self.client.send_audio_chunk(&chunk);

        self.cells.amplitude.send_replace(levels.peak());
    }

    /// Read until the stopped device reports nothing left
    fn drain(
        &mut self,
        buffer: &mut [i16],
        sequence: &mut u64,
        frames: &mut u64,
        samples_read: &mut u64,
    ) {
        let channels = self.config.channels.max(1) as usize;

        for _ in 0..MAX_DRAIN_READS {
            let n = match self.device.read(buffer) {
                Ok(n) => n,
                Err(e) => {
                    warn!("Device read failed while draining: {:#}", e);
                    return;
                }
            };
            let whole = n - n % channels;
            if whole == 0 {
                return;
            }
            self.process(&buffer[..whole], sequence, frames);
            *samples_read += whole as u64;
        }

        warn!(
            "{} kept producing audio after stop; drain cut short",
            self.device.name()
        );
    }

    fn mark_speaker_boundary(&self) {
        if !self.segment_on_speaker_switch {
            return;
        }
        match self.store.lock() {
            Ok(mut store) => store.mark_boundary(SegmentReason::SpeakerSwitch),
            Err(poisoned) => poisoned
                .into_inner()
                .mark_boundary(SegmentReason::SpeakerSwitch),
        }
    }
}
