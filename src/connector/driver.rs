use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use super::Shared;
use crate::error::ConnectorError;
use crate::transport::{Frame, FrameSink, Socket};

/// Drive one socket from handshake to close.
///
/// Outbound frames are forwarded before inbound ones are read, so everything
/// queued before a close request is flushed ahead of the close frame.
#[tracing::instrument(
    name = "chat.socket",
    skip(shared, outbound, close),
    fields(group_id = %shared.config.group_id)
)]
pub(super) async fn run_socket(
    shared: Arc<Shared>,
    generation: u64,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut close: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        result = shared.transport.open(&url) => result,
        _ = &mut close => {
            tracing::debug!("Socket closed before the handshake completed");
            shared.handle_close(generation);
            return;
        }
    };

    let Socket {
        mut sink,
        mut stream,
    } = match opened {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Failed to open group chat socket");
            shared.handle_error(generation, ConnectorError::Transport(e));
            shared.handle_close(generation);
            return;
        }
    };

    shared.handle_open(generation);

    loop {
        tokio::select! {
            biased;

            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(text).await {
                        tracing::warn!(error = %e, "Failed to write frame");
                        shared.handle_error(generation, ConnectorError::Transport(e));
                        break;
                    }
                }
                None => {
                    close_socket(&mut sink, &mut outbound).await;
                    break;
                }
            },
            _ = &mut close => {
                close_socket(&mut sink, &mut outbound).await;
                break;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Frame::Text(text))) => shared.handle_text(generation, &text),
                Some(Ok(Frame::Close)) | None => {
                    tracing::debug!("Socket closed by server");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Socket read failed");
                    shared.handle_error(generation, ConnectorError::Transport(e));
                    break;
                }
            },
        }
    }

    shared.handle_close(generation);
}

/// Flush what is still queued, then close the sink
async fn close_socket(sink: &mut FrameSink, outbound: &mut mpsc::UnboundedReceiver<String>) {
    while let Ok(text) = outbound.try_recv() {
        if let Err(e) = sink.feed(text).await {
            tracing::debug!(error = %e, "Dropping queued frames, sink already gone");
            return;
        }
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "Error while closing socket");
    }
}
