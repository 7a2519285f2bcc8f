//! Configuration types for the room chat application.
//!
//! Command-line arguments are parsed with `arrrg`; the resolved
//! [`ChatConfig`] carries everything a [`super::ChatSession`] needs.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::ChatSender;

/// Command-line arguments for the parlor-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Room to join on startup.
    #[arrrg(optional, "Room to join, e.g. a listing id", "ROOM")]
    pub room: Option<String>,

    /// Stable user id attached to messages and typing signals.
    #[arrrg(optional, "Your user id", "ID")]
    pub user: Option<String>,

    /// Display name shown to others.
    #[arrrg(optional, "Your display name", "NAME")]
    pub name: Option<String>,

    /// YAML client configuration file.
    #[arrrg(optional, "Client configuration file (YAML)", "FILE")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Room to join on startup.
    pub room: Option<String>,

    /// Who we are; anonymous when `None`.
    pub sender: Option<ChatSender>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Where the client configuration came from, if a file.
    pub config_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a ChatConfig with no room, an anonymous user, and color enabled.
    pub fn new() -> Self {
        Self {
            room: None,
            sender: None,
            use_color: true,
            config_path: None,
        }
    }

    /// Sets the room to join on startup.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Sets who we are.
    pub fn with_sender(mut self, sender: ChatSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Load the client configuration this chat points at.
    pub fn client_config(&self) -> Result<ClientConfig> {
        ClientConfig::load(self.config_path.as_deref())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        // A name alone still needs an id; reuse the name.
        let sender = match (args.user, args.name) {
            (Some(id), name) => Some(ChatSender::new(id, name)),
            (None, Some(name)) => Some(ChatSender::new(name.clone(), Some(name))),
            (None, None) => None,
        };
        ChatConfig {
            room: args.room.filter(|room| !room.is_empty()),
            sender,
            use_color: !args.no_color,
            config_path: args.config.map(PathBuf::from),
        }
    }
}
