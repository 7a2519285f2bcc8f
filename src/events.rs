//! Event names used on the shared connection.

/// Client asks the server to add it to a room.  Payload: the room id.
pub const JOIN_ROOM: &str = "joinRoom";

/// Client asks the server to remove it from a room.  Payload: the room id.
pub const LEAVE_ROOM: &str = "leaveRoom";

/// A chat message, in both directions.
pub const MESSAGE: &str = "message";

/// A typing signal, in both directions.
pub const TYPING: &str = "typing";

/// Server-pushed record changes.
pub const LIVE_UPDATE: &str = "live:update";
