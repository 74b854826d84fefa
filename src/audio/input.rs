//! Concrete input sources.
//!
//! Sources are listed in priority order in the configuration and probed
//! one after another until one opens (see
//! [`open_first_available`](super::backend::open_first_available)).

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::backend::{AudioInput, CaptureConfig, InputProbe};
use super::file::AudioFile;
use super::wav::WavFormat;

/// One candidate input source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// Capture device whose name contains `name` (case-insensitive)
    Device { name: String },
    /// The host's default capture device
    Default,
    /// Replay a WAV file as if it were a live device
    File {
        path: PathBuf,
        /// Pace reads at the file's real duration
        #[serde(default = "default_realtime")]
        realtime: bool,
    },
}

fn default_realtime() -> bool {
    true
}

impl InputProbe for InputSource {
    fn label(&self) -> String {
        match self {
            Self::Device { name } => format!("device:{}", name),
            Self::Default => "default".to_string(),
            Self::File { path, .. } => format!("file:{}", path.display()),
        }
    }

    fn try_open(&self, config: &CaptureConfig) -> Result<Box<dyn AudioInput>> {
        match self {
            Self::File { path, realtime } => {
                let input = FileInput::open(path, config, *realtime)?;
                Ok(Box::new(input))
            }

            #[cfg(feature = "microphone")]
            Self::Device { name } => {
                let input = microphone::MicrophoneInput::open(Some(name), config)?;
                Ok(Box::new(input))
            }

            #[cfg(feature = "microphone")]
            Self::Default => {
                let input = microphone::MicrophoneInput::open(None, config)?;
                Ok(Box::new(input))
            }

            #[cfg(not(feature = "microphone"))]
            Self::Device { .. } | Self::Default => {
                bail!("live capture requires the `microphone` feature")
            }
        }
    }
}

/// Replays decoded WAV samples through the device interface
pub struct FileInput {
    name: String,
    samples: Vec<i16>,
    position: usize,
    channels: u16,
    sample_rate: u32,
    running: bool,
    realtime: bool,
    idle_wait: Duration,
}

impl FileInput {
    pub fn open(path: &Path, config: &CaptureConfig, realtime: bool) -> Result<Self> {
        let file = AudioFile::open(path)?;
        if file.samples.is_empty() {
            bail!("{} contains no audio", path.display());
        }

        let samples = file.conformed(WavFormat::new(config.channels, config.sample_rate));

        info!(
            "File input ready: {} ({} samples after conversion to {}Hz/{}ch)",
            path.display(),
            samples.len(),
            config.sample_rate,
            config.channels
        );

        Ok(Self {
            name: path.display().to_string(),
            samples,
            position: 0,
            channels: config.channels.max(1),
            sample_rate: config.sample_rate,
            running: false,
            realtime,
            idle_wait: config.chunk_duration(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioInput for FileInput {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if !self.running {
            return Ok(0);
        }

        let channels = self.channels as usize;
        let wanted = buf.len() - buf.len() % channels;
        let n = wanted.min(self.remaining());

        if n == 0 {
            // End of file behaves like a silent device
            std::thread::sleep(self.idle_wait);
            return Ok(0);
        }

        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;

        if self.realtime {
            let frames = (n / channels) as u64;
            std::thread::sleep(Duration::from_micros(
                frames * 1_000_000 / self.sample_rate.max(1) as u64,
            ));
        }

        Ok(n)
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Convert interleaved samples to the target channel count and rate
pub fn conform(
    samples: &[i16],
    from_channels: u16,
    from_rate: u32,
    to_channels: u16,
    to_rate: u32,
) -> Vec<i16> {
    let remixed = remix(samples, from_channels, to_channels);
    resample_linear(&remixed, to_channels, from_rate, to_rate)
}

/// Change channel count: mono is duplicated, extra channels are dropped,
/// and downmix to mono averages the first two channels.
pub fn remix(samples: &[i16], from_channels: u16, to_channels: u16) -> Vec<i16> {
    let from = from_channels.max(1) as usize;
    let to = to_channels.max(1) as usize;
    if from == to {
        return samples.to_vec();
    }

    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            let mixed = if from == 1 {
                frame[0] as i32
            } else {
                (frame[0] as i32 + frame[1] as i32) / 2
            };
            out.push(mixed as i16);
        } else {
            for ch in 0..to {
                out.push(frame[ch.min(from - 1)]);
            }
        }
    }
    out
}

/// Linear-interpolation resampler over interleaved frames
pub fn resample_linear(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let channels = channels.max(1) as usize;
    let in_frames = samples.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }
    let out_frames = ((in_frames as u64 * to_rate as u64) / from_rate as u64).max(1) as usize;
    let step = from_rate as f64 / to_rate as f64;

    let mut out = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(in_frames - 1);
        let next = (idx + 1).min(in_frames - 1);
        let frac = pos - idx as f64;

        for ch in 0..channels {
            let a = samples[idx * channels + ch] as f64;
            let b = samples[next * channels + ch] as f64;
            out.push((a + (b - a) * frac).round() as i16);
        }
    }
    out
}

#[cfg(feature = "microphone")]
mod microphone {
    use anyhow::{anyhow, bail, Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};
    use tracing::{error, info, warn};

    use super::conform;
    use crate::audio::backend::{AudioInput, CaptureConfig};

    enum StreamCommand {
        Play,
        Pause,
        Close,
    }

    /// A cpal capture device.
    ///
    /// cpal streams are not `Send`, so the stream lives on its own thread and
    /// is driven through a command channel; samples come back already
    /// converted to the capture format.
    pub struct MicrophoneInput {
        name: String,
        channels: u16,
        samples_rx: mpsc::Receiver<Vec<i16>>,
        commands: mpsc::Sender<StreamCommand>,
        stream_thread: Option<JoinHandle<()>>,
        pending: VecDeque<i16>,
        running: bool,
        read_wait: Duration,
    }

    impl MicrophoneInput {
        pub fn open(name: Option<&str>, config: &CaptureConfig) -> Result<Self> {
            let host = cpal::default_host();
            let (device, device_name) = select_device(&host, name)?;

            let supported = device
                .default_input_config()
                .with_context(|| format!("{}: no default input config", device_name))?;
            let sample_format = supported.sample_format();
            let stream_config: StreamConfig = supported.into();
            let native_rate = stream_config.sample_rate.0;
            let native_channels = stream_config.channels;

            let (samples_tx, samples_rx) = mpsc::channel::<Vec<i16>>();
            let (commands, command_rx) = mpsc::channel::<StreamCommand>();
            let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

            let target = config.clone();
            let label = device_name.clone();
            let stream_thread = std::thread::Builder::new()
                .name("voxlink-capture".into())
                .spawn(move || {
                    let stream = match build_stream_for_format(
                        &device,
                        &stream_config,
                        sample_format,
                        &target,
                        samples_tx,
                        &label,
                    ) {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    while let Ok(command) = command_rx.recv() {
                        let result = match command {
                            StreamCommand::Play => stream.play().map_err(|e| e.to_string()),
                            StreamCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                            StreamCommand::Close => break,
                        };
                        if let Err(e) = result {
                            error!("{}: stream control failed: {}", label, e);
                        }
                    }

                    drop(stream);
                    info!("{}: capture stream closed", label);
                })
                .context("Failed to spawn capture thread")?;

            ready_rx
                .recv()
                .map_err(|_| anyhow!("{}: capture thread exited during setup", device_name))??;

            info!(
                "Microphone ready: {} ({}Hz/{}ch, converted to {}Hz/{}ch)",
                device_name,
                native_rate,
                native_channels,
                config.sample_rate,
                config.channels
            );

            Ok(Self {
                name: device_name,
                channels: config.channels.max(1),
                samples_rx,
                commands,
                stream_thread: Some(stream_thread),
                pending: VecDeque::new(),
                running: false,
                read_wait: config.chunk_duration(),
            })
        }

        fn whole_frames(&self, n: usize) -> usize {
            n - n % self.channels as usize
        }
    }

    impl AudioInput for MicrophoneInput {
        fn start(&mut self) -> Result<()> {
            self.commands
                .send(StreamCommand::Play)
                .map_err(|_| anyhow!("{}: capture thread is gone", self.name))?;
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.running = false;
            self.commands
                .send(StreamCommand::Pause)
                .map_err(|_| anyhow!("{}: capture thread is gone", self.name))
        }

        fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
            let wanted = self.whole_frames(buf.len());
            let deadline = Instant::now() + self.read_wait;

            while self.pending.len() < wanted {
                let next = if self.running {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.samples_rx.recv_timeout(deadline - now).ok()
                } else {
                    self.samples_rx.try_recv().ok()
                };

                match next {
                    Some(samples) => self.pending.extend(samples),
                    None => break,
                }
            }

            let n = self.whole_frames(self.pending.len().min(wanted));
            for (slot, sample) in buf.iter_mut().zip(self.pending.drain(..n)) {
                *slot = sample;
            }
            Ok(n)
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl Drop for MicrophoneInput {
        fn drop(&mut self) {
            let _ = self.commands.send(StreamCommand::Close);
            if let Some(handle) = self.stream_thread.take() {
                if handle.join().is_err() {
                    warn!("{}: capture thread panicked", self.name);
                }
            }
        }
    }

    fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<(cpal::Device, String)> {
        match name {
            Some(wanted) => {
                let wanted_lower = wanted.to_lowercase();
                let devices = host
                    .input_devices()
                    .context("Failed to enumerate input devices")?;
                for device in devices {
                    let Ok(device_name) = device.name() else {
                        continue;
                    };
                    if device_name.to_lowercase().contains(&wanted_lower) {
                        return Ok((device, device_name));
                    }
                }
                bail!("no input device matching '{}'", wanted)
            }
            None => {
                let device = host
                    .default_input_device()
                    .ok_or_else(|| anyhow!("no default input device"))?;
                let device_name = device
                    .name()
                    .unwrap_or_else(|_| "Default Input".to_string());
                Ok((device, device_name))
            }
        }
    }

    fn build_stream_for_format(
        device: &cpal::Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        target: &CaptureConfig,
        samples_tx: mpsc::Sender<Vec<i16>>,
        label: &str,
    ) -> Result<cpal::Stream> {
        match sample_format {
            SampleFormat::I16 => build_stream::<i16>(device, config, target, samples_tx, label),
            SampleFormat::U16 => build_stream::<u16>(device, config, target, samples_tx, label),
            SampleFormat::F32 => build_stream::<f32>(device, config, target, samples_tx, label),
            other => bail!("{}: unsupported sample format {:?}", label, other),
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        target: &CaptureConfig,
        samples_tx: mpsc::Sender<Vec<i16>>,
        label: &str,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + Send + 'static,
        i16: FromSample<T>,
    {
        let from_channels = config.channels;
        let from_rate = config.sample_rate.0;
        let to_channels = target.channels;
        let to_rate = target.sample_rate;
        let error_label = label.to_string();

        let stream = device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let raw: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                    let converted = conform(&raw, from_channels, from_rate, to_channels, to_rate);
                    let _ = samples_tx.send(converted);
                },
                move |err| {
                    error!("{} input stream error: {}", error_label, err);
                },
                None,
            )
            .with_context(|| format!("{}: failed to build input stream", label))?;

        // Streams may auto-start on some hosts; stay silent until start()
        let _ = stream.pause();

        Ok(stream)
    }
}
