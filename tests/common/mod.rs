// Shared test doubles: a scripted capture device and an in-memory transport.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use voxlink::audio::{AudioInput, CaptureConfig, InputProbe};
use voxlink::protocol::{
    ConnectionStatus, Connector, Link, LinkSink, LinkStream, SessionParams,
};

// ============================================================================
// Scripted capture device
// ============================================================================

/// Counters shared between a test and the device it handed to the controller
#[derive(Default)]
pub struct DeviceStats {
    /// Interleaved samples returned by `read`
    pub samples_delivered: AtomicU64,
    pub reads: AtomicU64,
    pub starts: AtomicU64,
    pub stops: AtomicU64,
    pub dropped: AtomicBool,
}

#[derive(Clone)]
pub struct DeviceScript {
    /// Per-sample amplitude of the left and right channel
    pub left: i16,
    pub right: i16,
    /// Delay per read, standing in for the device period
    pub read_delay: Duration,
    /// Reads that still return data after `stop()`
    pub tail_reads: usize,
    /// Return a partial frame on odd reads
    pub ragged: bool,
    /// Open fine but refuse to start
    pub start_fails: bool,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            left: 3000,
            right: 1000,
            read_delay: Duration::from_millis(5),
            tail_reads: 2,
            ragged: false,
            start_fails: false,
        }
    }
}

pub struct ScriptedInput {
    script: DeviceScript,
    channels: u16,
    running: bool,
    tail_left: usize,
    stats: Arc<DeviceStats>,
}

impl AudioInput for ScriptedInput {
    fn start(&mut self) -> Result<()> {
        if self.script.start_fails {
            bail!("device busy");
        }
        self.running = true;
        self.tail_left = self.script.tail_reads;
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if !self.running {
            if self.tail_left == 0 {
                return Ok(0);
            }
            self.tail_left -= 1;
        } else {
            std::thread::sleep(self.script.read_delay);
        }

        let reads = self.stats.reads.fetch_add(1, Ordering::SeqCst);
        let channels = self.channels as usize;
        let mut n = buf.len() - buf.len() % channels;
        if self.script.ragged && reads % 2 == 1 {
            // Half a buffer plus one dangling sample
            n = n / 2 + 1;
        }

        for (i, slot) in buf[..n].iter_mut().enumerate() {
            *slot = if channels > 1 && i % channels == 1 {
                self.script.right
            } else {
                self.script.left
            };
        }

        self.stats
            .samples_delivered
            .fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl Drop for ScriptedInput {
    fn drop(&mut self) {
        self.stats.dropped.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedProbe {
    pub label: String,
    pub available: bool,
    pub script: DeviceScript,
    pub stats: Arc<DeviceStats>,
}

impl ScriptedProbe {
    pub fn working(script: DeviceScript) -> (Arc<Self>, Arc<DeviceStats>) {
        let stats = Arc::new(DeviceStats::default());
        let probe = Arc::new(Self {
            label: "scripted".into(),
            available: true,
            script,
            stats: stats.clone(),
        });
        (probe, stats)
    }

    pub fn unstartable(label: &str) -> (Arc<Self>, Arc<DeviceStats>) {
        let stats = Arc::new(DeviceStats::default());
        let probe = Arc::new(Self {
            label: label.into(),
            available: true,
            script: DeviceScript {
                start_fails: true,
                ..DeviceScript::default()
            },
            stats: stats.clone(),
        });
        (probe, stats)
    }

    pub fn broken(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            available: false,
            script: DeviceScript::default(),
            stats: Arc::new(DeviceStats::default()),
        })
    }
}

impl InputProbe for ScriptedProbe {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn try_open(&self, config: &CaptureConfig) -> Result<Box<dyn AudioInput>> {
        if !self.available {
            bail!("{} is not available", self.label);
        }
        Ok(Box::new(ScriptedInput {
            script: self.script.clone(),
            channels: config.channels,
            running: false,
            tail_left: 0,
            stats: self.stats.clone(),
        }))
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

/// Connector that fails for selected endpoints and records everything
#[derive(Clone, Default)]
pub struct MockConnector {
    failing: Arc<Mutex<HashSet<String>>>,
    /// Endpoints passed to `open`, in order
    pub attempts: Arc<Mutex<Vec<String>>>,
    /// Client status observed at the start of each `open`
    pub observed: Arc<Mutex<Vec<ConnectionStatus>>>,
    /// Where `observed` is read from; set after the client exists
    pub status_source: Arc<Mutex<Option<watch::Receiver<ConnectionStatus>>>>,
    /// Text frames written by the client, across all links
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
    /// Feeds the most recent link's incoming side
    server: Arc<Mutex<Option<mpsc::UnboundedSender<Result<String>>>>>,
    params: Arc<Mutex<Vec<SessionParams>>>,
}

impl MockConnector {
    pub fn failing(endpoints: &[&str]) -> Self {
        let connector = Self::default();
        {
            let mut failing = connector.failing.lock().unwrap();
            failing.extend(endpoints.iter().map(|e| e.to_string()));
        }
        connector
    }

    pub fn observe(&self, status: watch::Receiver<ConnectionStatus>) {
        *self.status_source.lock().unwrap() = Some(status);
    }

    /// Push a frame as if the server had sent it
    pub fn server_says(&self, frame: &str) {
        if let Some(tx) = self.server.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(frame.to_string()));
        }
    }

    /// Make the current link fail with a transport error
    pub fn break_link(&self) {
        if let Some(tx) = self.server.lock().unwrap().as_ref() {
            let _ = tx.send(Err(anyhow::anyhow!("connection reset by peer")));
        }
    }

    /// Close the current link from the server side
    pub fn hang_up(&self) {
        self.server.lock().unwrap().take();
    }

    pub fn sent_frames(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent_frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn last_params(&self) -> Option<SessionParams> {
        self.params.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &str, params: &SessionParams) -> Result<Link> {
        if let Some(status) = self.status_source.lock().unwrap().as_ref() {
            self.observed.lock().unwrap().push(status.borrow().clone());
        }
        self.attempts.lock().unwrap().push(endpoint.to_string());
        self.params.lock().unwrap().push(params.clone());

        if self.failing.lock().unwrap().contains(endpoint) {
            bail!("connection refused");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.server.lock().unwrap() = Some(tx);

        Ok(Link {
            sink: Box::new(MockSink {
                sent: self.sent.clone(),
                closed: self.closed.clone(),
            }),
            stream: Box::new(MockStream { rx }),
        })
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LinkSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl LinkStream for MockStream {
    async fn next_text(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn params(recording_id: &str) -> SessionParams {
    SessionParams {
        recording_id: recording_id.to_string(),
        user_id: "user-1".to_string(),
        source_language: "cs".to_string(),
        target_language: "en".to_string(),
        providers: voxlink::protocol::ProviderConfig {
            llm_provider: "ollama".into(),
            llm_api_key: String::new(),
            transcription_provider: "local".into(),
            transcription_api_key: String::new(),
        },
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
