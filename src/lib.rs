//! Real-time room messaging and streaming assistant client.
//!
//! - [`ConnectionManager`] owns the one shared socket; [`Connection`] handles
//!   emit events and register listeners on it.
//! - [`RoomMembership`], [`ChatRoom`] and [`ChatPanel`] scope chat and typing
//!   to a room.
//! - [`Subscription`] keeps one listener registered per event while its
//!   handler is swapped freely.
//! - [`Assistant`] asks the listing assistant over a synchronous call, a
//!   chunked HTTP stream or a WebSocket, producing [`StreamEvent`]s.

// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod chat_room;
pub mod client;
pub mod client_logger;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod live;
pub mod multiplex;
pub mod observability;
pub mod render;
pub mod room;
pub mod sse;
pub mod types;
pub mod utils;
pub mod ws_stream;

// Re-exports
pub use accumulating_stream::AccumulatingStream;
pub use chat_room::{ChatPanel, ChatRoom, PanelEvent, TYPING_WINDOW, TypingIndicator};
pub use client::{Assistant, EventStream, Transport, describe_error, error_message};
pub use client_logger::ClientLogger;
pub use config::ClientConfig;
pub use connection::{
    Connection, ConnectionManager, ConnectionState, Connector, ListenerId, ReconnectConfig,
    WebSocketConnector,
};
pub use error::{Error, Result};
pub use live::{live_updates, live_updates_on};
pub use multiplex::Subscription;
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use room::RoomMembership;
pub use types::*;
