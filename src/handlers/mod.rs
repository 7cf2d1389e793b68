//! Caller-registered callbacks, keyed by dispatch key.
//!
//! Each table holds exactly one handler per key; registering again for the
//! same key replaces the previous handler.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::ConnectorError;

/// Handler for an inbound envelope type, called with the envelope's `data`
pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handler for a connection lifecycle event; only `error` carries an error
pub type ConnectionHandler = Arc<dyn Fn(Option<&ConnectorError>) + Send + Sync>;

/// Connection lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Error,
}

impl ConnectionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Disconnected => "disconnected",
            ConnectionEvent::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown connection event: {0}")]
pub struct UnknownConnectionEvent(pub String);

impl FromStr for ConnectionEvent {
    type Err = UnknownConnectionEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(ConnectionEvent::Connected),
            "disconnected" => Ok(ConnectionEvent::Disconnected),
            "error" => Ok(ConnectionEvent::Error),
            other => Err(UnknownConnectionEvent(other.to_string())),
        }
    }
}

/// Last-write-wins mapping from dispatch key to handler
pub struct HandlerTable<K, H> {
    handlers: DashMap<K, H>,
}

impl<K, H> HandlerTable<K, H>
where
    K: Eq + Hash,
    H: Clone,
{
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register `handler` for `key`, returning true if it replaced one
    pub fn register(&self, key: K, handler: H) -> bool {
        self.handlers.insert(key, handler).is_some()
    }

    /// Handler currently registered for `key`.
    ///
    /// The handler is cloned out so no map guard is held while it runs.
    pub fn get<Q>(&self, key: &Q) -> Option<H>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.handlers.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<K, H> Default for HandlerTable<K, H>
where
    K: Eq + Hash,
    H: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
