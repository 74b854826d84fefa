//! Duplex text transport underneath the streaming client.
//!
//! The client only needs "open a link to this endpoint", "send a text frame"
//! and "receive the next text frame", so the transport is a small trait
//! seam. [`WsConnector`] is the WebSocket implementation used in production;
//! tests substitute their own connectors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::messages::SessionParams;

/// Outgoing half of an open link
#[async_trait]
pub trait LinkSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Incoming half of an open link
#[async_trait]
pub trait LinkStream: Send {
    /// Next text frame; `None` once the peer closed the link cleanly.
    ///
    /// Must be cancel-safe: the client polls it inside `select!`.
    async fn next_text(&mut self) -> Option<Result<String>>;
}

/// An established link, split into its two halves
pub struct Link {
    pub sink: Box<dyn LinkSink>,
    pub stream: Box<dyn LinkStream>,
}

/// Opens links to candidate endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str, params: &SessionParams) -> Result<Link>;
}

/// Append the session identity to an endpoint URL
pub fn endpoint_url(endpoint: &str, params: &SessionParams) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!(
        "{}{}user_id={}&recording_id={}",
        endpoint, separator, params.user_id, params.recording_id
    )
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector (`ws://` / `wss://` endpoints)
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str, params: &SessionParams) -> Result<Link> {
        let url = endpoint_url(endpoint, params);
        info!("Opening WebSocket to {}", endpoint);

        let (ws, response) = connect_async(url.as_str())
            .await
            .with_context(|| format!("WebSocket handshake with {} failed", endpoint))?;
        debug!("WebSocket upgrade status: {}", response.status());

        let (sink, stream) = ws.split();
        Ok(Link {
            sink: Box::new(WsSink { inner: sink }),
            stream: Box::new(WsSource { inner: stream }),
        })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl LinkSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .context("WebSocket send failed")
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await.context("WebSocket close failed")
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl LinkStream for WsSource {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!("Server closed WebSocket: {:?}", frame);
                    return None;
                }
                Ok(Message::Binary(bytes)) => {
                    debug!("Ignoring {}-byte binary frame", bytes.len());
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
