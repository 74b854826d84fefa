//! Streaming protocol client.
//!
//! One logical connection at a time, chosen from an ordered candidate list.
//! Failover only happens while connecting; once a link is established a
//! transport failure moves the client to `Error` and it stays there until the
//! next `connect()`.
//!
//! ```text
//!  Disconnected ──► Connecting(A) ──► Connecting(B) ──► Connected
//!        ▲               │                 │                │
//!        │               └──────► Error ◄──┘◄───────────────┤ transport failure
//!        └──────────────────────────────────────────────────┘ clean close / disconnect()
//! ```

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{frame_type, ClientMessage, Command, ServerMessage, SessionParams};
use super::transport::{Connector, Link, LinkSink, LinkStream};
use crate::audio::AudioChunk;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Legal transitions. In particular `Disconnected` never jumps
    /// straight to `Connected`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Connected, Error)
                | (Error, Connecting)
                | (Error, Disconnected)
        )
    }
}

/// Connection state plus the endpoint it refers to
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Per-candidate limit for opening the link
    pub connect_timeout: Duration,
    /// Frames buffered between callers and the socket writer
    pub outbound_queue: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            outbound_queue: 256,
        }
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct ActiveLink {
    generation: u64,
    params: SessionParams,
    outbound: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

/// State shared with the link's I/O task
struct Shared {
    status: watch::Sender<ConnectionStatus>,
    messages: broadcast::Sender<ServerMessage>,
    /// Bumped by every connect/disconnect; stale tasks stop publishing
    generation: AtomicU64,
}

impl Shared {
    fn transition(&self, state: ConnectionState, endpoint: Option<String>) -> bool {
        self.status.send_if_modified(|current| {
            if current.state == state && state != ConnectionState::Connecting {
                return false;
            }
            if !current.state.can_transition_to(state) {
                warn!(
                    "Ignoring illegal connection transition {:?} -> {:?}",
                    current.state, state
                );
                return false;
            }
            debug!("Connection {:?} -> {:?} ({:?})", current.state, state, endpoint);
            *current = ConnectionStatus { state, endpoint };
            true
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, message: ServerMessage) {
        // No subscribers is fine
        let _ = self.messages.send(message);
    }
}

pub struct StreamingClient {
    connector: Arc<dyn Connector>,
    settings: ClientSettings,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveLink>>,
}

impl StreamingClient {
    pub fn new(connector: Arc<dyn Connector>, settings: ClientSettings) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (messages, _) = broadcast::channel(256);

        Self {
            connector,
            settings,
            shared: Arc::new(Shared {
                status,
                messages,
                generation: AtomicU64::new(0),
            }),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.borrow().state
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.shared.messages.subscribe()
    }

    /// Connect to the first reachable candidate, in order.
    ///
    /// Each candidate is attempted at most once per call. The configuration
    /// handshake is the first frame on the new link and is written before the
    /// client reports `Connected`.
    pub async fn connect(
        &self,
        candidates: &[String],
        params: SessionParams,
    ) -> Result<String, TransportError> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.close_active() {
            info!("Replacing existing connection");
        }
        self.shared.transition(ConnectionState::Disconnected, None);

        if candidates.is_empty() {
            self.shared.transition(ConnectionState::Connecting, None);
            self.shared.transition(ConnectionState::Error, None);
            self.shared
                .publish(ServerMessage::Error("No server endpoints configured".into()));
            return Err(TransportError::NoCandidates);
        }

        let mut last_error = String::new();

        for (index, endpoint) in candidates.iter().enumerate() {
            if !self.shared.is_current(generation) {
                return Err(TransportError::Closed);
            }

            self.shared
                .transition(ConnectionState::Connecting, Some(endpoint.clone()));
            if index > 0 {
                self.shared.publish(ServerMessage::Info(format!(
                    "Trying backup server {} of {}",
                    index + 1,
                    candidates.len()
                )));
            }
            info!("Connecting to {} ({}/{})", endpoint, index + 1, candidates.len());

            match self.open_with_handshake(endpoint, &params).await {
                Ok(link) => {
                    if !self.shared.is_current(generation) {
                        let mut sink = link.sink;
                        let _ = sink.close().await;
                        return Err(TransportError::Closed);
                    }

                    self.activate(link, generation, params);
                    self.shared
                        .transition(ConnectionState::Connected, Some(endpoint.clone()));
                    info!("Connected to {}", endpoint);
                    return Ok(endpoint.clone());
                }
                Err(e) => {
                    warn!("{}", e);
                    last_error = e.to_string();
                }
            }
        }

        if self.shared.is_current(generation) {
            self.shared.transition(ConnectionState::Error, None);
            self.shared.publish(ServerMessage::Error(format!(
                "All servers unavailable: {}",
                last_error
            )));
        }
        error!("All {} server endpoints unavailable", candidates.len());

        Err(TransportError::Exhausted {
            attempted: candidates.len(),
            last: last_error,
        })
    }

    /// Queue one audio chunk. Never blocks; returns whether it was queued.
    pub fn send_audio_chunk(&self, chunk: &AudioChunk) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }

        let Ok(guard) = self.active.lock() else {
            return false;
        };
        let Some(link) = guard.as_ref() else {
            return false;
        };

        let message = ClientMessage::Audio {
            data: base64::engine::general_purpose::STANDARD.encode(chunk.to_le_bytes()),
            recording_id: link.params.recording_id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            sequence: chunk.sequence,
        };

        Self::enqueue(link, &message)
    }

    /// Queue a control command. Dropped unless connected.
    pub fn send_command(&self, command: Command) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!("Not connected; dropping command {:?}", command);
            return false;
        }

        let Ok(mut guard) = self.active.lock() else {
            return false;
        };
        let Some(link) = guard.as_mut() else {
            return false;
        };

        if let Command::LanguageSwap {
            source_language,
            target_language,
            ..
        } = &command
        {
            link.params.source_language = source_language.clone();
            link.params.target_language = target_language.clone();
        }

        let message = ClientMessage::from_command(command, &link.params);
        Self::enqueue(link, &message)
    }

    pub fn request_tts(&self, text: &str, voice: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.send_command(Command::Tts {
            text: text.to_string(),
            voice: voice.to_string(),
        })
    }

    /// Close the current link, if any. Idempotent.
    ///
    /// Frames already queued are flushed before the close frame when the
    /// queue has room; otherwise the link is dropped.
    pub fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if self.close_active() {
            info!("Disconnected");
        }
        self.shared.transition(ConnectionState::Disconnected, None);
    }

    fn close_active(&self) -> bool {
        let link = match self.active.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match link {
            Some(link) => {
                if link.outbound.try_send(Outbound::Close).is_err() {
                    link.task.abort();
                }
                true
            }
            None => false,
        }
    }

    async fn open_with_handshake(
        &self,
        endpoint: &str,
        params: &SessionParams,
    ) -> Result<Link, TransportError> {
        let failed = |reason: String| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let mut link = tokio::time::timeout(
            self.settings.connect_timeout,
            self.connector.open(endpoint, params),
        )
        .await
        .map_err(|_| failed(format!("timed out after {:?}", self.settings.connect_timeout)))?
        .map_err(|e| failed(format!("{:#}", e)))?;

        let handshake = ClientMessage::handshake(params, chrono::Utc::now().timestamp_millis());
        let text = serde_json::to_string(&handshake).map_err(|e| failed(e.to_string()))?;
        link.sink
            .send_text(text)
            .await
            .map_err(|e| failed(format!("handshake failed: {:#}", e)))?;

        Ok(link)
    }

    fn activate(&self, link: Link, generation: u64, params: SessionParams) {
        let (outbound, outbound_rx) = mpsc::channel(self.settings.outbound_queue.max(1));
        let task = tokio::spawn(run_link(
            link.sink,
            link.stream,
            outbound_rx,
            self.shared.clone(),
            generation,
        ));

        let active = ActiveLink {
            generation,
            params,
            outbound,
            task,
        };

        match self.active.lock() {
            Ok(mut guard) => *guard = Some(active),
            Err(poisoned) => *poisoned.into_inner() = Some(active),
        }
    }

    fn enqueue(link: &ActiveLink, message: &ClientMessage) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                return false;
            }
        };

        match link.outbound.try_send(Outbound::Text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full; dropping {} message (link {})",
                    message.kind(),
                    link.generation
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        self.close_active();
    }
}

/// Socket I/O for one link: drains the outbound queue and fans out
/// incoming frames until either side closes.
async fn run_link(
    mut sink: Box<dyn LinkSink>,
    mut stream: Box<dyn LinkStream>,
    mut outbound: mpsc::Receiver<Outbound>,
    shared: Arc<Shared>,
    generation: u64,
) {
    let failure = loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send_text(text).await {
                        break Some(format!("send failed: {:#}", e));
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = sink.close().await {
                        debug!("Close failed: {:#}", e);
                    }
                    break None;
                }
            },
            incoming = stream.next_text() => match incoming {
                Some(Ok(text)) => dispatch_frame(&shared, &text),
                Some(Err(e)) => break Some(format!("receive failed: {:#}", e)),
                None => {
                    info!("Server closed the connection");
                    break None;
                }
            },
        }
    };

    if !shared.is_current(generation) {
        return;
    }

    match failure {
        Some(reason) => {
            error!("Connection lost: {}", reason);
            shared.transition(ConnectionState::Error, None);
            shared.publish(ServerMessage::Error(format!("Connection lost: {}", reason)));
        }
        None => {
            shared.transition(ConnectionState::Disconnected, None);
        }
    }
}

fn dispatch_frame(shared: &Shared, text: &str) {
    match ServerMessage::parse(text) {
        Ok(Some(message)) => {
            debug!("Received {} message", message.kind());
            shared.publish(message);
        }
        Ok(None) => {
            debug!(
                "Ignoring server message of unknown type {:?}",
                frame_type(text)
            );
        }
        Err(e) => {
            warn!("Dropping malformed server message: {}", e);
        }
    }
}
