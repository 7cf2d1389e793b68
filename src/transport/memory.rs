//! In-process transport.
//!
//! Every socket opened through a [`MemoryTransport`] shows up on the paired
//! [`MemoryServer`] as a [`MemoryPeer`], which sees the connector's outbound
//! frames and can push inbound frames, fail or close the socket.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::{sink, stream};
use tokio::sync::mpsc;

use super::{Frame, Socket, Transport};
use crate::error::TransportError;

pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
    opened: AtomicUsize,
}

pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server side of one in-memory socket
pub struct MemoryPeer {
    pub url: String,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                refusing: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
            },
            MemoryServer { accept_rx },
        )
    }

    /// Make subsequent `open` calls fail
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of sockets opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<Socket, TransportError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Refused(url.to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.to_string(),
            outbound_rx,
            inbound_tx,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::Refused(url.to_string()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);

        let sink = sink::unfold(outbound_tx, |tx, text: String| async move {
            tx.send(text).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });
        let stream = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        Ok(Socket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

impl MemoryServer {
    /// Wait for the next socket opened by the connector
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

impl MemoryPeer {
    /// Push a text frame to the connector
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inbound_tx.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    /// Deliver a transport error to the connector
    pub fn fail(&self, error: TransportError) -> bool {
        self.inbound_tx.send(Err(error)).is_ok()
    }

    /// Close the socket from the server side
    pub fn close(&self) -> bool {
        self.inbound_tx.send(Ok(Frame::Close)).is_ok()
    }

    /// Next frame sent by the connector, `None` once its side is gone
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound_rx.try_recv().ok()
    }
}
