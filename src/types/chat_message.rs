use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Who is speaking in a room.  Attached to outgoing messages and typing signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSender {
    /// Stable user identifier.
    pub sender_id: String,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl ChatSender {
    /// Create a sender with an id and an optional display name.
    pub fn new(sender_id: impl Into<String>, sender_name: Option<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name,
        }
    }
}

/// Payload emitted on the `message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    /// The room the message is for.
    pub room_id: String,
    /// Message text.
    pub content: String,
    /// Sender id, when the sender is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Sender display name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// When the message was written.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::utils::time::option"
    )]
    pub timestamp: Option<OffsetDateTime>,
}

/// A chat message received from a room.  Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// The room the message belongs to.
    pub room_id: String,
    /// Message text.
    pub content: String,
    /// Sender id; empty when the backend did not say.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sender_id: String,
    /// Sender display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// When the message was written; missing or unreadable values are filled in on receipt.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::utils::time::lenient"
    )]
    pub timestamp: Option<OffsetDateTime>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
