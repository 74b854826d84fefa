use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::capture::{CaptureControl, CaptureLoop, CaptureOutcome};
use super::clock::ElapsedClock;
use super::config::{SessionConfig, StartRequest};
use super::library::{remove_if_present, RecordingLibrary};
use super::observe::{pump_server_messages, SessionWatch, StateCells};
use super::stats::{
    FinishedRecording, RecordingMetadata, RecordingState, SegmentInfo, SessionSnapshot,
};
use crate::audio::{
    open_first_available, AudioStore, InputProbe, SegmentCut, SegmentReason, SpeakerDiarizer,
    SpeakerMode, WavContainerWriter, WavFormat,
};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{Command, ConnectionState, Connector, SessionParams, StreamingClient};

/// Everything that exists only while a session is running
struct ActiveSession {
    id: String,
    started_at: DateTime<Utc>,
    device_label: String,
    source_language: String,
    target_language: String,
    control: mpsc::UnboundedSender<CaptureControl>,
    capture: JoinHandle<CaptureOutcome>,
    timer: JoinHandle<()>,
    pump: JoinHandle<()>,
    connect: JoinHandle<()>,
    store: Arc<std::sync::Mutex<AudioStore>>,
    clock: Arc<std::sync::Mutex<ElapsedClock>>,
    segments: Vec<SegmentInfo>,
}

/// Top-level recording state machine.
///
/// Owns the input device for the duration of a session, runs the capture
/// loop, the elapsed-time timer and the server message pump, and publishes
/// everything a UI needs through [`SessionWatch`].
pub struct SessionController {
    config: SessionConfig,
    probes: Vec<Arc<dyn InputProbe>>,
    client: Arc<StreamingClient>,
    cells: Arc<StateCells>,
    active: Mutex<Option<ActiveSession>>,
    pending: Mutex<Option<FinishedRecording>>,
    chunks_captured: Arc<AtomicU64>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        probes: Vec<Arc<dyn InputProbe>>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let client = Arc::new(StreamingClient::new(connector, config.client.clone()));

        Self {
            config,
            probes,
            client,
            cells: Arc::new(StateCells::new()),
            active: Mutex::new(None),
            pending: Mutex::new(None),
            chunks_captured: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<StreamingClient> {
        &self.client
    }

    /// Receivers for every observable value
    pub fn watch(&self) -> SessionWatch {
        self.cells.watch(self.client.status())
    }

    pub fn state(&self) -> RecordingState {
        *self.cells.state.borrow()
    }

    /// Start a session.
    ///
    /// Fails with `DeviceUnavailable` when no input source opens. The
    /// connection is established in the background; capture starts
    /// immediately and chunks are only streamed once connected.
    pub async fn start(&self, request: StartRequest) -> SessionResult<String> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let source_language = request
            .source_language
            .unwrap_or_else(|| self.config.source_language.clone());
        let target_language = request
            .target_language
            .unwrap_or_else(|| self.config.target_language.clone());
        let providers = request
            .providers
            .unwrap_or_else(|| self.config.providers.clone());

        info!(
            "Starting session {} ({} -> {})",
            session_id, source_language, target_language
        );

        let probes = self.probes.clone();
        let capture_config = self.config.capture.clone();
        let (device, device_label) = tokio::task::spawn_blocking(move || {
            open_first_available(&probes, &capture_config)
        })
        .await
        .map_err(|e| SessionError::Io(std::io::Error::other(e)))??;

        if let Some(previous) = self.pending.lock().await.take() {
            info!(
                "Keeping undecided recording {} on disk; starting a new session",
                previous.id
            );
        }

        self.cells.reset();
        self.chunks_captured.store(0, Ordering::Relaxed);

        let store = Arc::new(std::sync::Mutex::new(AudioStore::new()));
        let clock = Arc::new(std::sync::Mutex::new(ElapsedClock::new()));
        with_clock(&clock, |c| c.start(Instant::now()));

        // Subscribe before connecting so connection notices are not missed
        let pump = tokio::spawn(pump_server_messages(
            self.client.subscribe(),
            self.cells.clone(),
        ));

        let (control, control_rx) = mpsc::unbounded_channel();
        let capture_loop = CaptureLoop {
            device,
            config: self.config.capture.clone(),
            diarizer: SpeakerDiarizer::new(self.config.diarizer.clone()),
            store: store.clone(),
            client: self.client.clone(),
            cells: self.cells.clone(),
            control: control_rx,
            segment_on_speaker_switch: self.config.segment_on_speaker_switch,
            chunks_captured: self.chunks_captured.clone(),
        };
        let capture = tokio::task::spawn_blocking(move || capture_loop.run());

        let params = SessionParams {
            recording_id: session_id.clone(),
            user_id: self.config.user_id.clone(),
            source_language: source_language.clone(),
            target_language: target_language.clone(),
            providers,
        };
        let client = self.client.clone();
        let endpoints = self.config.endpoints.clone();
        let connect = tokio::spawn(async move {
            if let Err(e) = client.connect(&endpoints, params).await {
                warn!("Streaming unavailable, recording locally only: {}", e);
            }
        });

        let timer = tokio::spawn(run_timer(
            clock.clone(),
            self.cells.clone(),
            self.config.timer_interval,
        ));

        *active = Some(ActiveSession {
            id: session_id.clone(),
            started_at: Utc::now(),
            device_label,
            source_language,
            target_language,
            control,
            capture,
            timer,
            pump,
            connect,
            store,
            clock,
            segments: Vec::new(),
        });
        self.cells.state.send_replace(RecordingState::Recording);

        Ok(session_id)
    }

    /// Stop device reads without ending the session. No-op while idle.
    pub async fn pause(&self) -> SessionResult<()> {
        let active = self.active.lock().await;
        let Some(session) = active.as_ref() else {
            return Ok(());
        };

        if self.state() == RecordingState::Paused {
            return Ok(());
        }

        session
            .control
            .send(CaptureControl::Pause)
            .map_err(|_| SessionError::NotActive)?;
        with_clock(&session.clock, |c| c.pause(Instant::now()));
        self.publish_elapsed(session);
        self.cells.state.send_replace(RecordingState::Paused);
        self.client.send_command(Command::Pause);

        info!("Session {} paused", session.id);
        Ok(())
    }

    /// No-op while idle
    pub async fn resume(&self) -> SessionResult<()> {
        let active = self.active.lock().await;
        let Some(session) = active.as_ref() else {
            return Ok(());
        };

        if self.state() == RecordingState::Recording {
            return Ok(());
        }

        session
            .control
            .send(CaptureControl::Resume)
            .map_err(|_| SessionError::NotActive)?;
        with_clock(&session.clock, |c| c.resume(Instant::now()));
        self.cells.state.send_replace(RecordingState::Recording);
        self.client.send_command(Command::Resume);

        info!("Session {} resumed", session.id);
        Ok(())
    }

    /// End the session.
    ///
    /// The capture loop is stopped and joined before the device is released,
    /// so every sample the device delivered ends up in the session file.
    /// The result is held until `save_session` or `discard_session`.
    pub async fn stop(&self) -> SessionResult<FinishedRecording> {
        let mut active = self.active.lock().await;
        let mut session = active.take().ok_or(SessionError::NotActive)?;

        info!("Stopping session {}", session.id);

        // Ignore a send error: the loop has already exited
        let _ = session.control.send(CaptureControl::Stop);
        let outcome = match (&mut session.capture).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Capture loop failed: {}", e);
                None
            }
        };
        let (samples_read, chunk_count) = match outcome {
            Some(outcome) => {
                info!("Releasing input {}", session.device_label);
                drop(outcome.device);
                (outcome.samples_read, outcome.chunks)
            }
            None => (0, 0),
        };

        session.timer.abort();
        with_clock(&session.clock, |c| c.stop(Instant::now()));
        let duration = self.publish_elapsed(&session);

        if self.client.state() == ConnectionState::Connected {
            self.client.send_command(Command::EndRecording {
                name: default_recording_name(),
            });
        }
        session.connect.abort();
        self.client.disconnect();
        session.pump.abort();

        // Segments only exist once a boundary was cut
        let (cuts, chunks) = {
            let mut store = lock_store(&session.store);
            let mut cuts = store.drain_marked();
            if store.has_segments() {
                cuts.extend(store.close_segment(SegmentReason::EndOfSession));
            }
            (cuts, store.snapshot())
        };
        let languages = (
            session.source_language.clone(),
            session.target_language.clone(),
        );
        let written = self.write_segments(&session.id, cuts, &languages).await;
        session.segments.extend(written);

        let path = self.recording_path(&session.id);
        let writer = WavContainerWriter::new(self.wav_format());
        let write_result = tokio::task::spawn_blocking({
            let path = path.clone();
            move || writer.write_file(&path, &chunks)
        })
        .await;

        let (file_path, write_error) = match write_result {
            Ok(Ok(summary)) => (Some(summary.path), None),
            Ok(Err(e)) => {
                error!("Failed to write session audio {}: {:#}", path.display(), e);
                (None, Some(format!("{:#}", e)))
            }
            Err(e) => {
                error!("WAV writer task failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let finished = FinishedRecording {
            id: session.id.clone(),
            user_id: self.config.user_id.clone(),
            file_path,
            write_error,
            started_at: session.started_at,
            duration_ms: duration.as_millis() as u64,
            sample_count: samples_read,
            chunk_count,
            source_language: session.source_language.clone(),
            target_language: session.target_language.clone(),
            original_text: self.cells.transcript.borrow().clone(),
            translated_text: self.cells.translation.borrow().clone(),
            segments: session.segments,
        };

        *self.pending.lock().await = Some(finished.clone());
        self.cells.amplitude.send_replace(0.0);
        self.cells.state.send_replace(RecordingState::Idle);

        info!(
            "Session {} stopped: {} samples in {} chunks, {:.1}s",
            finished.id,
            finished.sample_count,
            finished.chunk_count,
            duration.as_secs_f64()
        );

        Ok(finished)
    }

    /// Close the current segment, write it, and tell the server the
    /// languages changed. Returns the id of the closed segment.
    pub async fn notify_language_swap(
        &self,
        source_language: &str,
        target_language: &str,
    ) -> SessionResult<String> {
        let mut active = self.active.lock().await;
        let session = active.as_mut().ok_or(SessionError::NotActive)?;

        let reason = SegmentReason::LanguageSwap {
            source: source_language.to_string(),
            target: target_language.to_string(),
        };
        let (cuts, next_index) = {
            let mut store = lock_store(&session.store);
            let mut cuts = store.drain_marked();
            cuts.extend(store.close_segment(reason));
            (cuts, store.next_segment_index())
        };

        let segment_id = cuts
            .last()
            .map(|cut| segment_id(&session.id, cut.index))
            .unwrap_or_else(|| segment_id(&session.id, next_index));

        // The closed audio was spoken under the outgoing pair
        let recorded_under = (
            session.source_language.clone(),
            session.target_language.clone(),
        );
        let written = self
            .write_segments(&session.id, cuts, &recorded_under)
            .await;
        session.segments.extend(written);

        session.source_language = source_language.to_string();
        session.target_language = target_language.to_string();

        self.client.send_command(Command::LanguageSwap {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            segment_id: segment_id.clone(),
        });

        info!(
            "Session {} swapped to {} -> {} at segment {}",
            session.id, source_language, target_language, segment_id
        );
        Ok(segment_id)
    }

    /// Manual speaker override; holds until the diarizer's cooldown passes
    /// and the audio says otherwise.
    pub async fn set_speaker_mode(&self, mode: SpeakerMode) -> SessionResult<()> {
        let active = self.active.lock().await;
        let session = active.as_ref().ok_or(SessionError::NotActive)?;

        session
            .control
            .send(CaptureControl::SetSpeaker(mode))
            .map_err(|_| SessionError::NotActive)
    }

    /// Ask the server to synthesise `text` in the current target language.
    /// Returns whether the request was sent.
    pub async fn request_tts(&self, text: &str) -> SessionResult<bool> {
        let active = self.active.lock().await;
        let session = active.as_ref().ok_or(SessionError::NotActive)?;

        Ok(self.client.request_tts(text, &session.target_language))
    }

    /// Forget the last synthesised audio once it has been played
    pub fn clear_tts_audio(&self) {
        self.cells.tts_audio.send_replace(None);
    }

    /// Persist the metadata record for the last stopped session
    pub async fn save_session(&self, name: Option<String>) -> SessionResult<RecordingMetadata> {
        let mut pending = self.pending.lock().await;
        let recording = pending.take().ok_or(SessionError::NothingPending)?;

        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(default_recording_name);
        let metadata = RecordingMetadata::from_recording(&recording, name);

        let path = self.library().metadata_path(&recording.id);
        let result = async {
            tokio::fs::create_dir_all(&self.config.recordings_path).await?;
            let json = serde_json::to_vec_pretty(&metadata)?;
            tokio::fs::write(&path, json).await?;
            Ok::<_, SessionError>(())
        }
        .await;

        if let Err(e) = result {
            // Keep the decision open so the caller can retry
            *pending = Some(recording);
            return Err(e);
        }

        info!("Saved recording {} as '{}'", metadata.id, metadata.name);
        Ok(metadata)
    }

    /// Delete the audio files of the last stopped session
    pub async fn discard_session(&self) -> SessionResult<FinishedRecording> {
        let recording = self
            .pending
            .lock()
            .await
            .take()
            .ok_or(SessionError::NothingPending)?;

        let files = recording
            .file_path
            .iter()
            .chain(recording.segments.iter().map(|s| &s.path));
        for path in files {
            remove_if_present(path).await;
        }

        info!("Discarded recording {}", recording.id);
        Ok(recording)
    }

    pub async fn pending_recording(&self) -> Option<FinishedRecording> {
        self.pending.lock().await.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let active = self.active.lock().await;
        let pending = self.pending.lock().await;

        let snapshot = SessionSnapshot {
            session_id: active.as_ref().map(|s| s.id.clone()),
            state: self.state(),
            elapsed_ms: self.cells.elapsed.borrow().as_millis() as u64,
            amplitude: *self.cells.amplitude.borrow(),
            transcript: self.cells.transcript.borrow().clone(),
            translation: self.cells.translation.borrow().clone(),
            connection: self.client.status().borrow().clone(),
            speaker_mode: *self.cells.speaker_mode.borrow(),
            tts_audio: self.cells.tts_audio.borrow().clone(),
            notice: self.cells.notice.borrow().clone(),
            source_language: active.as_ref().map(|s| s.source_language.clone()),
            target_language: active.as_ref().map(|s| s.target_language.clone()),
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            pending_recording: pending.as_ref().map(|r| r.id.clone()),
        };
        snapshot
    }

    fn wav_format(&self) -> WavFormat {
        WavFormat::new(self.config.capture.channels, self.config.capture.sample_rate)
    }

    fn recording_path(&self, session_id: &str) -> PathBuf {
        self.config.recordings_path.join(format!("{}.wav", session_id))
    }

    /// Recordings saved under the configured output directory
    pub fn library(&self) -> RecordingLibrary {
        RecordingLibrary::new(&self.config.recordings_path)
    }

    fn publish_elapsed(&self, session: &ActiveSession) -> Duration {
        let elapsed = match session.clock.lock() {
            Ok(clock) => clock.elapsed(Instant::now()),
            Err(poisoned) => poisoned.into_inner().elapsed(Instant::now()),
        };
        self.cells.elapsed.send_replace(elapsed);
        elapsed
    }

    /// Write segment files labelled with the `(source, target)` pair they
    /// were recorded under; failures are logged and the segment skipped
    async fn write_segments(
        &self,
        session_id: &str,
        cuts: Vec<SegmentCut>,
        languages: &(String, String),
    ) -> Vec<SegmentInfo> {
        let mut written = Vec::with_capacity(cuts.len());

        for cut in cuts {
            let id = segment_id(session_id, cut.index);
            let path = self.config.recordings_path.join(format!("{}.wav", id));
            let writer = WavContainerWriter::new(self.wav_format());

            let info = SegmentInfo {
                id: id.clone(),
                index: cut.index,
                path: path.clone(),
                reason: SegmentInfo::reason_name(&cut.reason).to_string(),
                source_language: Some(languages.0.clone()),
                target_language: Some(languages.1.clone()),
                first_sequence: cut.first_sequence(),
                last_sequence: cut.last_sequence(),
                sample_count: cut.sample_count(),
            };

            let result =
                tokio::task::spawn_blocking(move || writer.write_file(&path, &cut.chunks)).await;
            match result {
                Ok(Ok(_)) => written.push(info),
                Ok(Err(e)) => error!("Failed to write segment {}: {:#}", id, e),
                Err(e) => error!("Segment writer task failed for {}: {}", id, e),
            }
        }

        written
    }
}

/// Refresh the elapsed-time cell until aborted
async fn run_timer(
    clock: Arc<std::sync::Mutex<ElapsedClock>>,
    cells: Arc<StateCells>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let elapsed = match clock.lock() {
            Ok(clock) => clock.elapsed(Instant::now()),
            Err(poisoned) => poisoned.into_inner().elapsed(Instant::now()),
        };
        cells.elapsed.send_replace(elapsed);
    }
}

fn with_clock(clock: &std::sync::Mutex<ElapsedClock>, f: impl FnOnce(&mut ElapsedClock)) {
    match clock.lock() {
        Ok(mut clock) => f(&mut clock),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

fn lock_store(store: &std::sync::Mutex<AudioStore>) -> std::sync::MutexGuard<'_, AudioStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn segment_id(session_id: &str, index: usize) -> String {
    format!("{}_seg{:03}", session_id, index)
}

/// "Recording YYYY-MM-DD HH:MM" in local time
pub fn default_recording_name() -> String {
    format!("Recording {}", chrono::Local::now().format("%Y-%m-%d %H:%M"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_ids_are_zero_padded() {
        assert_eq!(segment_id("abc", 2), "abc_seg002");
    }

    #[test]
    fn test_default_name_format() {
        let name = default_recording_name();
        assert!(name.starts_with("Recording "));
        // "Recording " + "YYYY-MM-DD HH:MM"
        assert_eq!(name.len(), "Recording ".len() + 16);
    }
}
