use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Error text sent back for frames that do not decode into a [`ClientFrame`].
pub const INVALID_MESSAGE_FORMAT: &str = "invalid message format";

/// Error text sent back when a frame claims a sender other than the socket's identity.
pub const SENDER_MISMATCH: &str = "sender does not match connection identity";

/// Error text sent back when the chat log rejected the write.
pub const STORE_FAILED: &str = "failed to store message";

/// Frames sent FROM client TO relay over the chat socket.
///
/// Unknown `type` tags fail to decode and are answered with an error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    ChatMessage {
        sender_id: String,
        receiver_id: String,
        message: String,
    },
}

/// Frames sent FROM relay TO client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A message addressed to this client, forwarded as soon as it was stored
    ChatMessage { data: ChatMessage },

    /// Confirmation to the sender that its message was stored
    MessageSent { data: ChatMessage },

    /// The last inbound frame was rejected; the connection stays open
    Error { message: String },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
