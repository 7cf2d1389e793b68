mod envelope;
pub mod payloads;

pub use envelope::{InboundEnvelope, OutboundEnvelope};
pub use payloads::{ChatMessage, ServerError, TypingNotice};

/// Inbound envelope types pushed by the group chat server
pub mod inbound {
    pub const NEW_MESSAGE: &str = "new_message";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const MESSAGE_HISTORY: &str = "message_history";
    pub const USER_TYPING: &str = "user_typing";
    pub const USER_STOP_TYPING: &str = "user_stop_typing";
    pub const ERROR: &str = "error";
}
