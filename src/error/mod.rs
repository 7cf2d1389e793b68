use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures raised by a socket transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Connection closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No tokio runtime available to drive the connection")]
    RuntimeUnavailable,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Short machine-readable code, used as a structured log field
    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::InvalidUrl { .. } => "INVALID_URL",
            ConnectorError::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            ConnectorError::Transport(_) => "TRANSPORT_ERROR",
            ConnectorError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
