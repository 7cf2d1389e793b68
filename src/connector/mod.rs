//! The group chat connector.
//!
//! A [`ChatConnector`] owns at most one live socket to
//! `{server_url}/ws/chat/{group_id}`. Outbound intents are serialized as
//! envelopes and handed to the socket driver; inbound envelopes are routed by
//! their `type` to caller-registered handlers. Nothing is retried or queued
//! across connections: failures are logged, reported to the `error` lifecycle
//! handler, and leave the connector ready for another `connect`.

mod driver;
mod typing;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};
use crate::handlers::{ConnectionEvent, ConnectionHandler, HandlerTable, MessageHandler};
use crate::protocol::{InboundEnvelope, OutboundEnvelope};
use crate::transport::{Transport, WebSocketTransport};

use self::typing::TypingTimer;

/// Snapshot returned by [`ChatConnector::connection_status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub group_id: String,
    pub user_id: String,
}

/// Handle to the socket owned by the connector
struct SocketHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    close: oneshot::Sender<()>,
}

impl SocketHandle {
    fn close(self) {
        // The driver may already be gone after a server-side close
        let _ = self.close.send(());
    }
}

#[derive(Default)]
struct ConnectionState {
    connected: bool,
    socket: Option<SocketHandle>,
    next_generation: u64,
}

impl ConnectionState {
    fn is_current(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.generation == generation)
    }

    /// Events of `generation` apply unless a newer socket has replaced it
    fn applies_to(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .map_or(true, |socket| socket.generation == generation)
    }
}

pub(crate) struct Shared {
    config: ConnectorConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    message_handlers: HandlerTable<String, MessageHandler>,
    connection_handlers: HandlerTable<ConnectionEvent, ConnectionHandler>,
    typing: TypingTimer,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Serialize `envelope` and hand it to the live socket
    fn send_envelope(&self, envelope: &OutboundEnvelope) -> bool {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(kind = envelope.kind(), error = %e, "Failed to serialize envelope");
                return false;
            }
        };

        let state = self.state();
        let socket = match state.socket.as_ref() {
            Some(socket) if state.connected => socket,
            _ => return false,
        };

        if socket.outbound.send(text).is_err() {
            tracing::warn!(kind = envelope.kind(), "Socket driver is gone, envelope dropped");
            return false;
        }

        tracing::debug!(
            group_id = %self.config.group_id,
            kind = envelope.kind(),
            "Envelope sent"
        );
        true
    }

    fn start_typing(&self) {
        if self.is_connected() {
            self.send_envelope(&OutboundEnvelope::typing(&self.config.user_id));
        }
    }

    fn stop_typing(&self) {
        if self.is_connected() {
            self.send_envelope(&OutboundEnvelope::stop_typing(&self.config.user_id));
        }
    }

    fn fire(&self, event: ConnectionEvent, error: Option<&ConnectorError>) {
        match self.connection_handlers.get(&event) {
            Some(handler) => handler(error),
            None => tracing::trace!(event = %event, "No lifecycle handler registered"),
        }
    }

    fn handle_open(&self, generation: u64) {
        {
            let mut state = self.state();
            if !state.is_current(generation) {
                tracing::debug!(generation, "Ignoring open of a superseded socket");
                return;
            }
            state.connected = true;
        }

        tracing::info!(
            group_id = %self.config.group_id,
            user_id = %self.config.user_id,
            "Connected to group chat"
        );
        self.fire(ConnectionEvent::Connected, None);
    }

    fn handle_text(&self, generation: u64, text: &str) {
        if !self.state().is_current(generation) {
            tracing::debug!(generation, "Dropping frame from a closed socket");
            return;
        }

        let envelope = match InboundEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    group_id = %self.config.group_id,
                    error = %e,
                    "Dropping malformed inbound frame"
                );
                if self.config.report_parse_errors {
                    self.fire(ConnectionEvent::Error, Some(&ConnectorError::MalformedEnvelope(e)));
                }
                return;
            }
        };

        match self.message_handlers.get(envelope.kind.as_str()) {
            Some(handler) => {
                let data = envelope.into_data();
                handler(&data);
            }
            None => {
                tracing::debug!(kind = %envelope.kind, "Message received with no registered handler");
            }
        }
    }

    fn handle_error(&self, generation: u64, error: ConnectorError) {
        if !self.state().applies_to(generation) {
            tracing::debug!(generation, error = %error, "Ignoring error of a superseded socket");
            return;
        }

        tracing::error!(
            group_id = %self.config.group_id,
            code = error.code(),
            error = %error,
            "Group chat socket error"
        );
        self.fire(ConnectionEvent::Error, Some(&error));
    }

    fn handle_close(&self, generation: u64) {
        {
            let mut state = self.state();
            if !state.applies_to(generation) {
                tracing::debug!(generation, "Ignoring close of a superseded socket");
                return;
            }
            state.socket = None;
            state.connected = false;
        }

        tracing::info!(group_id = %self.config.group_id, "Disconnected from group chat");
        self.fire(ConnectionEvent::Disconnected, None);
    }
}

/// Client connector for one group chat as one user.
///
/// Cloning is cheap and every clone drives the same connection, so a clone
/// can be moved into handlers that need to reply.
#[derive(Clone)]
pub struct ChatConnector {
    shared: Arc<Shared>,
}

impl ChatConnector {
    /// Connector for `group_id` / `user_id` against the default local server
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::with_config(ConnectorConfig::new(group_id, user_id))
    }

    pub fn with_config(config: ConnectorConfig) -> Self {
        Self::with_transport(config, Arc::new(WebSocketTransport))
    }

    pub fn with_transport(config: ConnectorConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                state: Mutex::new(ConnectionState::default()),
                message_handlers: HandlerTable::new(),
                connection_handlers: HandlerTable::new(),
                typing: TypingTimer::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    /// Open the socket and start dispatching its events.
    ///
    /// Returns immediately; the `connected` handler fires once the handshake
    /// completes. Failures are logged and leave the connector disconnected.
    pub fn connect(&self) {
        if let Err(e) = self.try_connect() {
            tracing::error!(
                group_id = %self.shared.config.group_id,
                code = e.code(),
                error = %e,
                "Failed to connect to group chat"
            );
        }
    }

    fn try_connect(&self) -> Result<()> {
        let url = self.shared.config.endpoint();
        self.shared
            .transport
            .check_endpoint(&url)
            .map_err(|e| ConnectorError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let runtime = Handle::try_current().map_err(|_| ConnectorError::RuntimeUnavailable)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        let generation = {
            let mut state = self.shared.state();
            if let Some(previous) = state.socket.take() {
                tracing::debug!(generation = previous.generation, "Replacing live socket");
                previous.close();
                state.connected = false;
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            state.socket = Some(SocketHandle {
                generation,
                outbound: outbound_tx,
                close: close_tx,
            });
            generation
        };

        tracing::info!(url = %url, generation, "Connecting to group chat");
        runtime.spawn(driver::run_socket(
            self.shared.clone(),
            generation,
            url,
            outbound_rx,
            close_rx,
        ));
        Ok(())
    }

    /// Close the live socket, if any. `connected` drops to false immediately.
    pub fn disconnect(&self) {
        let socket = {
            let mut state = self.shared.state();
            let socket = state.socket.take();
            if socket.is_some() {
                state.connected = false;
            }
            socket
        };

        if let Some(socket) = socket {
            tracing::info!(generation = socket.generation, "Closing group chat socket");
            socket.close();
        }
    }

    /// Send a chat message; false if not connected
    pub fn send_message(&self, text: &str) -> bool {
        if !self.shared.is_connected() {
            tracing::warn!(group_id = %self.shared.config.group_id, "Not connected, message not sent");
            return false;
        }
        self.shared
            .send_envelope(&OutboundEnvelope::send_message(&self.shared.config.user_id, text))
    }

    pub fn start_typing(&self) {
        self.shared.start_typing();
    }

    pub fn stop_typing(&self) {
        self.shared.stop_typing();
    }

    /// Signal typing now and send `stop_typing` once the debounce window
    /// passes without another call.
    ///
    /// `typing` goes out under the timer lock, so a stale `stop_typing` can
    /// never land after it.
    pub fn handle_typing(&self) {
        self.shared.typing.arm(
            self.shared.config.typing_debounce,
            &self.shared,
            Shared::start_typing,
            Shared::stop_typing,
        );
    }

    /// Register the handler for inbound envelopes of type `kind`
    pub fn on_message<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.shared.message_handlers.register(kind.clone(), Arc::new(handler)) {
            tracing::debug!(kind = %kind, "Replaced message handler");
        }
    }

    /// Like [`on_message`](Self::on_message), with `data` deserialized into `T`.
    /// Payloads that do not fit `T` are logged and dropped.
    pub fn on_message_as<T, F>(&self, kind: impl Into<String>, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let key = kind.clone();
        self.on_message(kind, move |data: &Value| match T::deserialize(data) {
            Ok(payload) => handler(payload),
            Err(e) => {
                tracing::warn!(kind = %key, error = %e, "Inbound data does not match expected payload");
            }
        });
    }

    /// Register the handler for a connection lifecycle event
    pub fn on_connection<F>(&self, event: ConnectionEvent, handler: F)
    where
        F: Fn(Option<&ConnectorError>) + Send + Sync + 'static,
    {
        if self.shared.connection_handlers.register(event, Arc::new(handler)) {
            tracing::debug!(event = %event, "Replaced lifecycle handler");
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: self.shared.is_connected(),
            group_id: self.shared.config.group_id.clone(),
            user_id: self.shared.config.user_id.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::ChatMessage;
    use crate::transport::{MemoryPeer, MemoryServer, MemoryTransport};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    type LifecycleLog = mpsc::UnboundedReceiver<(ConnectionEvent, Option<String>)>;

    fn memory_connector(config: ConnectorConfig) -> (ChatConnector, Arc<MemoryTransport>, MemoryServer) {
        let (transport, server) = MemoryTransport::new();
        let transport = Arc::new(transport);
        let connector = ChatConnector::with_transport(config, transport.clone());
        (connector, transport, server)
    }

    /// Record every lifecycle event through registered handlers
    fn record_lifecycle(connector: &ChatConnector) -> LifecycleLog {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in [
            ConnectionEvent::Connected,
            ConnectionEvent::Disconnected,
            ConnectionEvent::Error,
        ] {
            let tx = tx.clone();
            connector.on_connection(event, move |error| {
                let _ = tx.send((event, error.map(|e| e.to_string())));
            });
        }
        rx
    }

    async fn connected(config: ConnectorConfig) -> (ChatConnector, MemoryPeer, LifecycleLog) {
        let (connector, _transport, mut server) = memory_connector(config);
        let mut events = record_lifecycle(&connector);

        connector.connect();
        let peer = server.accept().await.unwrap();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Connected);

        (connector, peer, events)
    }

    fn default_config() -> ConnectorConfig {
        ConnectorConfig::new("group-1", "user-1")
    }

    fn kind_of(frame: &str) -> String {
        let value: Value = serde_json::from_str(frame).unwrap();
        value["type"].as_str().unwrap().to_string()
    }

    /// Forward every `data` delivered for `kind` into a channel
    fn capture(connector: &ChatConnector, kind: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        connector.on_message(kind, move |data| {
            let _ = tx.send(data.clone());
        });
        rx
    }

    #[test]
    fn test_status_before_connect() {
        let connector = ChatConnector::new("group-1", "user-1");
        let status = connector.connection_status();

        assert!(!status.is_connected);
        assert_eq!(status.group_id, "group-1");
        assert_eq!(status.user_id, "user-1");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"isConnected": false, "groupId": "group-1", "userId": "user-1"})
        );
    }

    #[test]
    fn test_connect_without_runtime_stays_disconnected() {
        let connector = ChatConnector::new("group-1", "user-1");
        connector.connect();
        assert!(!connector.is_connected());
        // Nothing to tear down
        connector.disconnect();
    }

    #[tokio::test]
    async fn test_send_message_while_disconnected() {
        let (connector, transport, _server) = memory_connector(default_config());

        assert!(!connector.send_message("hello"));
        assert_eq!(transport.opened(), 0);
    }

    #[tokio::test]
    async fn test_send_message_wire_format() {
        let (connector, mut peer, _events) = connected(default_config()).await;

        assert!(peer.url.ends_with("/ws/chat/group-1"));
        assert!(connector.send_message("hello"));
        assert_eq!(
            peer.recv().await.unwrap(),
            r#"{"type":"send_message","data":{"user_id":"user-1","message":"hello"}}"#
        );
    }

    #[tokio::test]
    async fn test_send_message_does_not_validate_text() {
        let (connector, mut peer, _events) = connected(default_config()).await;

        assert!(connector.send_message(""));
        assert!(connector.send_message("   "));

        let first: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(first["data"]["message"], "");
        assert_eq!(second["data"]["message"], "   ");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (connector, mut peer, mut events) = connected(default_config()).await;

        connector.disconnect();
        assert!(!connector.is_connected());
        connector.disconnect();
        assert!(!connector.is_connected());

        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Disconnected);
        assert!(peer.recv().await.is_none());
        assert!(events.try_recv().is_err());
        assert!(!connector.send_message("after close"));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_a_no_op() {
        let (connector, _transport, _server) = memory_connector(default_config());
        let mut events = record_lifecycle(&connector);

        connector.disconnect();
        tokio::task::yield_now().await;

        assert!(!connector.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_frames_are_flushed_before_close() {
        let (connector, mut peer, _events) = connected(default_config()).await;

        assert!(connector.send_message("first"));
        assert!(connector.send_message("second"));
        connector.disconnect();

        let frames: Vec<Value> = [peer.recv().await.unwrap(), peer.recv().await.unwrap()]
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect();
        assert_eq!(frames[0]["data"]["message"], "first");
        assert_eq!(frames[1]["data"]["message"], "second");
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_inbound_envelope_dispatched_once() {
        let (connector, peer, _events) = connected(default_config()).await;
        let mut messages = capture(&connector, "new_message");
        let mut sentinel = capture(&connector, "sentinel");

        peer.push_text(r#"{"type":"new_message","data":{"text":"hi"}}"#);
        peer.push_text(r#"{"type":"sentinel","data":{}}"#);

        sentinel.recv().await.unwrap();
        assert_eq!(messages.try_recv().unwrap(), json!({"text": "hi"}));
        assert!(messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unhandled_type_is_ignored() {
        let (connector, peer, mut events) = connected(default_config()).await;
        let mut sentinel = capture(&connector, "sentinel");

        peer.push_text(r#"{"type":"new_message","data":{"text":"hi"}}"#);
        peer.push_text(r#"{"type":"sentinel","data":{}}"#);

        sentinel.recv().await.unwrap();
        assert!(connector.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_last_registered_handler_receives_dispatch() {
        let (connector, peer, _events) = connected(default_config()).await;
        let mut first = capture(&connector, "user_typing");
        let mut second = capture(&connector, "user_typing");

        peer.push_text(r#"{"type":"user_typing","data":{"user_id":"u-2"}}"#);

        assert_eq!(second.recv().await.unwrap(), json!({"user_id": "u-2"}));
        // The replaced handler was dropped along with its sender
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped_silently_by_default() {
        let (connector, peer, mut events) = connected(default_config()).await;
        let mut sentinel = capture(&connector, "sentinel");

        peer.push_text("{not json");
        peer.push_text(r#"{"data":{}}"#);
        peer.push_text(r#"{"type":"sentinel","data":{}}"#);

        sentinel.recv().await.unwrap();
        assert!(connector.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frame_reported_when_enabled() {
        let config = default_config().with_report_parse_errors(true);
        let (connector, peer, mut events) = connected(config).await;

        peer.push_text("{not json");

        let (event, error) = events.recv().await.unwrap();
        assert_eq!(event, ConnectionEvent::Error);
        assert!(error.unwrap().starts_with("Malformed envelope"));
        assert!(connector.is_connected());
    }

    #[tokio::test]
    async fn test_server_close_marks_disconnected_without_reconnect() {
        let (connector, transport, mut server) = memory_connector(default_config());
        let mut events = record_lifecycle(&connector);

        connector.connect();
        let peer = server.accept().await.unwrap();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Connected);
        assert!(connector.is_connected());

        peer.close();

        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Disconnected);
        assert!(!connector.is_connected());
        tokio::task::yield_now().await;
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_reaches_error_handler() {
        let (connector, peer, mut events) = connected(default_config()).await;

        peer.fail(TransportError::Refused("reset by peer".to_string()));

        let (event, error) = events.recv().await.unwrap();
        assert_eq!(event, ConnectionEvent::Error);
        assert_eq!(
            error.as_deref(),
            Some("Transport error: Connection refused: reset by peer")
        );
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Disconnected);
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn test_refused_connection_can_be_retried() {
        let (connector, transport, mut server) = memory_connector(default_config());
        let mut events = record_lifecycle(&connector);
        transport.set_refusing(true);

        connector.connect();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Error);
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Disconnected);
        assert!(!connector.is_connected());

        transport.set_refusing(false);
        connector.connect();
        let _peer = server.accept().await.unwrap();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Connected);
        assert!(connector.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_never_opens_transport() {
        let config = default_config().with_server_url("not a url");
        let (connector, transport, _server) = memory_connector(config);
        let mut events = record_lifecycle(&connector);

        connector.connect();
        tokio::task::yield_now().await;

        assert_eq!(transport.opened(), 0);
        assert!(!connector.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_live_socket() {
        let (connector, _transport, mut server) = memory_connector(default_config());
        let mut events = record_lifecycle(&connector);

        connector.connect();
        let mut old_peer = server.accept().await.unwrap();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Connected);

        connector.connect();
        let mut new_peer = server.accept().await.unwrap();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Connected);

        // The superseded socket closes without touching the new one
        assert!(old_peer.recv().await.is_none());
        assert!(connector.is_connected());
        assert!(events.try_recv().is_err());

        assert!(connector.send_message("on the new socket"));
        let frame: Value = serde_json::from_str(&new_peer.recv().await.unwrap()).unwrap();
        assert_eq!(frame["data"]["message"], "on the new socket");
    }

    #[tokio::test]
    async fn test_typing_signals_require_connection() {
        let (connector, mut peer, _events) = connected(default_config()).await;

        connector.start_typing();
        connector.stop_typing();
        assert_eq!(peer.recv().await.unwrap(), r#"{"type":"typing","data":{"user_id":"user-1"}}"#);
        assert_eq!(
            peer.recv().await.unwrap(),
            r#"{"type":"stop_typing","data":{"user_id":"user-1"}}"#
        );

        connector.disconnect();
        connector.start_typing();
        connector.stop_typing();
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_typing_debounces_stop_signal() {
        let (connector, mut peer, _events) = connected(default_config()).await;

        connector.handle_typing();
        tokio::time::advance(Duration::from_millis(500)).await;
        connector.handle_typing();
        tokio::time::advance(Duration::from_millis(500)).await;
        connector.handle_typing();
        let last_call = Instant::now();

        for _ in 0..3 {
            assert_eq!(kind_of(&peer.recv().await.unwrap()), "typing");
        }

        tokio::time::advance(Duration::from_millis(1999)).await;
        tokio::task::yield_now().await;
        assert!(peer.try_recv().is_none());

        assert_eq!(kind_of(&peer.recv().await.unwrap()), "stop_typing");
        assert!(last_call.elapsed() >= Duration::from_millis(2000));

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_typing_uses_configured_window() {
        let config = default_config().with_typing_debounce(Duration::from_millis(300));
        let (connector, mut peer, _events) = connected(config).await;

        connector.handle_typing();
        let start = Instant::now();

        assert_eq!(kind_of(&peer.recv().await.unwrap()), "typing");
        assert_eq!(kind_of(&peer.recv().await.unwrap()), "stop_typing");
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_handler_can_reply_through_connector() {
        let (connector, mut peer, _events) = connected(default_config()).await;

        let replier = connector.clone();
        connector.on_message("ping", move |_| {
            replier.send_message("pong");
        });

        peer.push_text(r#"{"type":"ping","data":{}}"#);

        let frame: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(frame["data"]["message"], "pong");
    }

    #[tokio::test]
    async fn test_typed_handler_deserializes_payload() {
        let (connector, peer, _events) = connected(default_config()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        connector.on_message_as::<ChatMessage, _>("new_message", move |message| {
            let _ = tx.send(message);
        });
        let mut sentinel = capture(&connector, "sentinel");

        // Missing fields: logged and dropped
        peer.push_text(r#"{"type":"new_message","data":{"text":"hi"}}"#);
        peer.push_text(
            r#"{"type":"new_message","data":{"id":"1","user_id":"u-2","group_id":"group-1","message":"hola","created_at":"now"}}"#,
        );
        peer.push_text(r#"{"type":"sentinel","data":{}}"#);

        sentinel.recv().await.unwrap();
        let message = rx.try_recv().unwrap();
        assert_eq!(message.message, "hola");
        assert_eq!(message.user_id, "u-2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_typing_while_disconnected_arms_timer_only() {
        let (connector, transport, mut server) = memory_connector(default_config());
        let mut events = record_lifecycle(&connector);

        // Fires with nobody to send to
        connector.handle_typing();
        tokio::time::advance(Duration::from_millis(2001)).await;
        tokio::task::yield_now().await;
        assert_eq!(transport.opened(), 0);
        assert!(!connector.is_connected());

        // A timer armed while disconnected still stops typing on a newer socket
        connector.handle_typing();
        connector.connect();
        let mut peer = server.accept().await.unwrap();
        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Connected);
        assert!(peer.try_recv().is_none());

        assert_eq!(kind_of(&peer.recv().await.unwrap()), "stop_typing");
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_during_handshake_fires_only_disconnected() {
        let (connector, _transport, _server) = memory_connector(default_config());
        let mut events = record_lifecycle(&connector);

        // The driver has not been polled yet
        connector.connect();
        connector.disconnect();
        assert!(!connector.is_connected());

        assert_eq!(events.recv().await.unwrap().0, ConnectionEvent::Disconnected);
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
        assert!(!connector.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_stop_typing_never_follows_newer_typing() {
        let config = default_config().with_typing_debounce(Duration::from_millis(1));
        let (connector, mut peer, _events) = connected(config).await;

        let typist = connector.clone();
        tokio::task::spawn_blocking(move || {
            for i in 0..2000u64 {
                typist.handle_typing();
                std::thread::sleep(Duration::from_micros(500 + (i % 6) * 500));
            }
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        connector.disconnect();

        let mut kinds = Vec::new();
        while let Some(frame) = peer.recv().await {
            kinds.push(kind_of(&frame));
        }

        assert_eq!(kinds.first().map(String::as_str), Some("typing"));
        assert_eq!(kinds.last().map(String::as_str), Some("stop_typing"));
        assert_eq!(kinds.iter().filter(|kind| *kind == "typing").count(), 2000);
        for pair in kinds.windows(2) {
            assert!(
                !(pair[0] == "stop_typing" && pair[1] == "stop_typing"),
                "stop_typing sent twice in a row"
            );
        }
    }
}
