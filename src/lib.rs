// Shared components
pub mod config;
pub mod error;
pub mod telemetry;

// Wire protocol and dispatch
pub mod handlers;
pub mod protocol;
pub mod transport;

// Client
pub mod connector;

pub use config::{ConnectorConfig, Settings};
pub use connector::{ChatConnector, ConnectionStatus};
pub use error::{ConnectorError, TransportError};
pub use handlers::ConnectionEvent;
pub use protocol::{InboundEnvelope, OutboundEnvelope};
