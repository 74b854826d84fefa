pub mod client;
pub mod messages;
pub mod transport;

pub use client::{ClientSettings, ConnectionState, ConnectionStatus, StreamingClient};
pub use messages::{ClientMessage, Command, ProviderConfig, ServerMessage, SessionParams};
pub use transport::{endpoint_url, Connector, Link, LinkSink, LinkStream, WsConnector};
