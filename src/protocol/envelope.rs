use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Envelopes sent from the connector to the chat server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    SendMessage { user_id: String, message: String },
    Typing { user_id: String },
    StopTyping { user_id: String },
}

impl OutboundEnvelope {
    pub fn send_message(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendMessage {
            user_id: user_id.into(),
            message: message.into(),
        }
    }

    pub fn typing(user_id: impl Into<String>) -> Self {
        Self::Typing {
            user_id: user_id.into(),
        }
    }

    pub fn stop_typing(user_id: impl Into<String>) -> Self {
        Self::StopTyping {
            user_id: user_id.into(),
        }
    }

    /// Wire name of the envelope type
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEnvelope::SendMessage { .. } => "send_message",
            OutboundEnvelope::Typing { .. } => "typing",
            OutboundEnvelope::StopTyping { .. } => "stop_typing",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Envelope received from the chat server.
///
/// `kind` is an opaque dispatch key. Some server frames (notably `error`)
/// carry their fields next to `type` instead of under `data`; those fields
/// are kept so they can stand in for the missing `data` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "present")]
    data: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl InboundEnvelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn into_data(self) -> Value {
        self.data.unwrap_or(Value::Object(self.rest))
    }
}
