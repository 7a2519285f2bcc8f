use serde::{Deserialize, Serialize};

/// Payload of the `typing` event, in both directions.  Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    /// The room the user is typing in.
    pub room_id: String,
    /// Who is typing; empty for anonymous senders.
    #[serde(default)]
    pub user_id: String,
    /// Display name of who is typing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl TypingSignal {
    /// The label shown in an "is typing" indicator.
    pub fn label(&self) -> &str {
        match self.user_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ if !self.user_id.is_empty() => &self.user_id,
            _ => "Someone",
        }
    }
}
