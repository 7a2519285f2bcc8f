//! Interactive room chat over the shared real-time connection.
//!
//! # Usage
//!
//! ```bash
//! # Join the room for listing 42 as user u-1
//! parlor-chat --room listing-42 --user u-1 --name Ravi
//!
//! # Point at another socket server
//! PARLOR_SOCKET_URL=ws://chat.internal:4000/ws parlor-chat --room listing-42
//! ```
//!
//! # Commands
//!
//! - `/room <id>` - Leave the current room and join another
//! - `/typing` - Tell the room you are typing
//! - `/status` - Show the connection state
//! - `/help` - Show available commands
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use parlor::chat::{ChatArgs, ChatConfig, ChatSession, Control, PlainTextRenderer};
use parlor::{ConnectionManager, WebSocketConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("parlor-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let client_config = config.client_config()?;

    let manager = ConnectionManager::start(
        client_config.socket_url.clone(),
        Arc::new(WebSocketConnector),
        client_config.reconnect(),
    );
    let renderer = Box::new(PlainTextRenderer::with_color(config.use_color));
    let mut session = ChatSession::new(&config, manager.connection(), renderer);
    let mut rl = DefaultEditor::new()?;

    println!("parlor chat ({})", client_config.socket_url);
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let prompt = match session.room_id() {
            Some(room) => format!("{room}> "),
            None => "> ".to_string(),
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                if session.handle_line(&line) == Control::Quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    // Leaving the room queues a leaveRoom that stop() flushes.
    drop(session);
    manager.stop().await;
    println!("Goodbye!");
    Ok(())
}
