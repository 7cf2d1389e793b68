//! Typed views of the data objects pushed by the group chat server.
//!
//! The connector itself never looks inside inbound data; these types are for
//! handlers registered through `ChatConnector::on_message_as`.

use serde::{Deserialize, Serialize};

/// A persisted chat message, as carried by `new_message`, `message_sent`
/// and each entry of `message_history`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub group_id: String,
    pub message: String,
    pub created_at: String,
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Payload of `user_typing` / `user_stop_typing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotice {
    pub user_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Payload of a server `error` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}
