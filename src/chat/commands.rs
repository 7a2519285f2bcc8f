//! Slash command parsing for the room chat.
//!
//! Input starting with `/` controls the session and is never sent to the
//! room.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Switch to another room.
    Room(String),

    /// Leave the current room without joining another.
    Leave,

    /// Tell the room we are typing.
    Typing,

    /// Show the connection state and current room.
    Status,

    /// List the messages received in this room.
    History,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent to the room as a message.
///
/// # Examples
///
/// ```
/// # use parlor::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("/room listing-42").is_some());
/// assert!(parse_command("Is it still available?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "room" | "join" => match argument {
            Some(room) if room.contains(char::is_whitespace) => {
                ChatCommand::Invalid("room ids cannot contain spaces".to_string())
            }
            Some(room) => ChatCommand::Room(room.to_string()),
            None => ChatCommand::Invalid("/room requires a room id".to_string()),
        },
        "leave" => ChatCommand::Leave,
        "typing" => ChatCommand::Typing,
        "status" => ChatCommand::Status,
        "history" => ChatCommand::History,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /room <id>             Leave the current room and join another
  /leave                 Leave the current room
  /typing                Tell the room you are typing
  /status                Show connection state and current room
  /history               Show messages received in this room
  /help                  Show this help message
  /quit                  Exit the chat

Anything else is sent to the current room."#
}
