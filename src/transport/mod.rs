//! Socket transports the connector can drive.
//!
//! A transport turns an endpoint URL into a [`Socket`]: a sink of outbound
//! text frames and a stream of inbound [`Frame`]s.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod websocket;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use crate::error::TransportError;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use websocket::WebSocketTransport;

/// Frame received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open, bidirectional socket
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a socket to `url`
    async fn open(&self, url: &str) -> Result<Socket, TransportError>;

    /// Check that `url` can be opened before any task is spawned for it
    fn check_endpoint(&self, url: &str) -> Result<(), TransportError> {
        url.into_client_request()?;
        Ok(())
    }
}
