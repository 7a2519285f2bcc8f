//! Interactive room chat over the shared connection.
//!
//! This module provides a line-oriented chat front end built on top of the
//! parlor library.  It supports:
//!
//! - Joining, switching and leaving rooms
//! - Live rendering of room messages and typing indicators
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Routing of typed lines to the room and rendering of room activity
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{ChatSession, Control, SharedRenderer};
