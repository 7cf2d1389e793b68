use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};

use super::{Frame, Socket, Transport};
use crate::error::TransportError;

/// WebSocket transport over `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    #[tracing::instrument(name = "ws.open", skip(self))]
    async fn open(&self, url: &str) -> Result<Socket, TransportError> {
        let (ws_stream, response) = connect_async(url).await?;
        tracing::debug!(status = %response.status(), "WebSocket handshake completed");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::WebSocket)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));
        let stream = read.filter_map(|message| future::ready(to_frame(message)));

        Ok(Socket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Map a WebSocket message onto a connector frame; control frames are dropped
fn to_frame(message: Result<Message, tungstenite::Error>) -> Option<Result<Frame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(Frame::Text(text))),
            Err(_) => {
                tracing::warn!(len = bytes.len(), "Dropping non UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(close_frame)) => {
            tracing::debug!(frame = ?close_frame, "Server sent close frame");
            Some(Ok(Frame::Close))
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(tungstenite::Error::ConnectionClosed) => Some(Ok(Frame::Close)),
        Err(e) => Some(Err(e.into())),
    }
}
