//! Core chat session management.
//!
//! A [`ChatSession`] turns lines typed at the prompt into room messages and
//! commands, and renders what the room sends back.

use std::sync::{Arc, Mutex, PoisonError};

use crate::chat::commands::{ChatCommand, help_text, parse_command};
use crate::chat::config::ChatConfig;
use crate::chat_room::{ChatPanel, PanelEvent};
use crate::client::describe_error;
use crate::connection::{Connection, ConnectionState};
use crate::render::Renderer;

/// A renderer shared between the prompt and the connection's listeners.
pub type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;

/// What the prompt loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Read the next line.
    Continue,
    /// Leave the chat.
    Quit,
}

/// One interactive chat over a shared connection.
pub struct ChatSession {
    connection: Connection,
    panel: ChatPanel,
    renderer: SharedRenderer,
}

impl ChatSession {
    /// Join `config.room` (if any) on `connection` and start rendering room activity.
    pub fn new(config: &ChatConfig, connection: Connection, renderer: Box<dyn Renderer>) -> Self {
        let renderer: SharedRenderer = Arc::new(Mutex::new(renderer));
        let panel = ChatPanel::new(
            Some(&connection),
            config.room.as_deref(),
            config.sender.clone(),
        );

        let me = config.sender.as_ref().map(|sender| sender.sender_id.clone());
        let sink = Arc::clone(&renderer);
        panel.observe(move |event| {
            let mut renderer = sink.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                PanelEvent::Message(message) => {
                    let mine = me.as_deref() == Some(message.sender_id.as_str());
                    renderer.print_message(&message, mine);
                }
                PanelEvent::Typing(label) => renderer.print_typing(&label),
            }
        });

        Self {
            connection,
            panel,
            renderer,
        }
    }

    /// The room being displayed, if any.
    pub fn room_id(&self) -> Option<&str> {
        self.panel.room_id()
    }

    /// The underlying panel.
    pub fn panel(&self) -> &ChatPanel {
        &self.panel
    }

    /// Handle one line of input.
    pub fn handle_line(&mut self, line: &str) -> Control {
        if let Some(command) = parse_command(line) {
            return self.handle_command(command);
        }
        if line.trim().is_empty() {
            return Control::Continue;
        }
        if self.panel.room_id().is_none() {
            self.error("join a room first with /room <id>");
            return Control::Continue;
        }
        if !self.connection.is_connected() {
            self.info(&format!(
                "{}; the message will be sent once connected",
                self.connection.state()
            ));
        }
        if let Err(err) = self.panel.submit(line) {
            self.error(&describe_error(&err));
        }
        Control::Continue
    }

    /// Handle a parsed command.
    pub fn handle_command(&mut self, command: ChatCommand) -> Control {
        match command {
            ChatCommand::Room(room) => {
                self.panel.set_room(Some(&room));
                self.info(&format!("joined {room}"));
            }
            ChatCommand::Leave => match self.panel.room_id().map(str::to_string) {
                Some(room) => {
                    self.panel.set_room(None);
                    self.info(&format!("left {room}"));
                }
                None => self.info("not in a room"),
            },
            ChatCommand::Typing => {
                if let Err(err) = self.panel.input_changed() {
                    self.error(&describe_error(&err));
                }
            }
            ChatCommand::Status => {
                let status = self.status_line();
                self.info(&status);
            }
            ChatCommand::History => {
                let messages = self.panel.messages();
                let mut renderer = self.renderer();
                if messages.is_empty() {
                    renderer.print_info("no messages yet");
                }
                for message in &messages {
                    renderer.print_message(message, self.panel.is_mine(message));
                }
            }
            ChatCommand::Help => self.info(help_text()),
            ChatCommand::Quit => return Control::Quit,
            ChatCommand::Invalid(message) => self.error(&message),
        }
        Control::Continue
    }

    /// One line summarizing connectivity and the current room.
    pub fn status_line(&self) -> String {
        let state = self.connection.state();
        let room = self.panel.room_id().unwrap_or("no room");
        let mut line = format!("connection #{}: {state}; room: {room}", self.connection.id());
        if let Some(label) = self.panel.typing_label() {
            line.push_str(&format!("; {label} is typing"));
        }
        if matches!(state, ConnectionState::Failed { .. }) {
            line.push_str("; restart to reconnect");
        }
        line
    }

    fn renderer(&self) -> std::sync::MutexGuard<'_, Box<dyn Renderer>> {
        self.renderer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn info(&self, info: &str) {
        self.renderer().print_info(info);
    }

    fn error(&self, error: &str) {
        self.renderer().print_error(error);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::types::{ChatMessage, ChatSender, Envelope, ListingReference};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, line: String) {
            self.0.lock().unwrap().push(line);
        }
    }

    impl Renderer for Recorder {
        fn print_step(&mut self, step: &str) {
            self.push(format!("step {step}"));
        }
        fn print_chunk(&mut self, text: &str) {
            self.push(format!("chunk {text}"));
        }
        fn print_references(&mut self, references: &[ListingReference]) {
            self.push(format!("references {}", references.len()));
        }
        fn print_error(&mut self, error: &str) {
            self.push(format!("error {error}"));
        }
        fn print_info(&mut self, info: &str) {
            self.push(format!("info {info}"));
        }
        fn print_message(&mut self, message: &ChatMessage, mine: bool) {
            let who = if mine { "me" } else { message.sender_id.as_str() };
            self.push(format!("message {who}: {}", message.content));
        }
        fn print_typing(&mut self, label: &str) {
            self.push(format!("typing {label}"));
        }
        fn finish_response(&mut self) {}
    }

    fn drain(outbound: &mut UnboundedReceiver<Envelope>) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(envelope) = outbound.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }

    fn session(room: Option<&str>) -> (ChatSession, UnboundedReceiver<Envelope>, Recorder) {
        let (connection, outbound) = Connection::detached();
        let recorder = Recorder::default();
        let mut config = ChatConfig::new().with_sender(ChatSender::new("u-1", Some("Ravi".into())));
        config.room = room.map(str::to_string);
        let session = ChatSession::new(&config, connection, Box::new(recorder.clone()));
        (session, outbound, recorder)
    }

    #[test]
    fn lines_become_room_messages() {
        let (mut session, mut outbound, _recorder) = session(Some("listing-42"));
        assert_eq!(session.handle_line("  Is it still available?  "), Control::Continue);

        let sent = drain(&mut outbound);
        assert_eq!(sent[0], Envelope::new("joinRoom", json!("listing-42")));
        assert_eq!(sent[1].event, "message");
        assert_eq!(sent[1].data["roomId"], "listing-42");
        assert_eq!(sent[1].data["content"], "Is it still available?");
        assert_eq!(sent[1].data["senderId"], "u-1");
    }

    #[test]
    fn no_room_no_message() {
        let (mut session, mut outbound, recorder) = session(None);
        session.handle_line("hello?");
        assert!(drain(&mut outbound).is_empty());
        assert_eq!(
            recorder.lines(),
            vec!["error join a room first with /room <id>".to_string()]
        );
    }

    #[test]
    fn switching_rooms_leaves_then_joins() {
        let (mut session, mut outbound, _recorder) = session(Some("listing-42"));
        session.handle_line("/room listing-7");
        session.handle_line("/leave");
        let events: Vec<(String, serde_json::Value)> = drain(&mut outbound)
            .into_iter()
            .map(|e| (e.event, e.data))
            .collect();
        assert_eq!(
            events,
            vec![
                ("joinRoom".to_string(), json!("listing-42")),
                ("leaveRoom".to_string(), json!("listing-42")),
                ("joinRoom".to_string(), json!("listing-7")),
                ("leaveRoom".to_string(), json!("listing-7")),
            ]
        );
        assert!(session.room_id().is_none());
    }

    #[test]
    fn incoming_activity_is_rendered() {
        let (session, _outbound, recorder) = session(Some("listing-42"));
        let connection = session.connection.clone();
        connection.dispatch(&Envelope::new(
            "message",
            json!({"roomId": "listing-42", "content": "Yes", "senderId": "u-2"}),
        ));
        connection.dispatch(&Envelope::new(
            "message",
            json!({"roomId": "listing-7", "content": "wrong room", "senderId": "u-3"}),
        ));
        connection.dispatch(&Envelope::new(
            "message",
            json!({"roomId": "listing-42", "content": "echo", "senderId": "u-1"}),
        ));
        connection.dispatch(&Envelope::new(
            "typing",
            json!({"roomId": "listing-42", "userId": "u-2", "userName": "Asha"}),
        ));
        assert_eq!(
            recorder.lines(),
            vec![
                "message u-2: Yes".to_string(),
                "message me: echo".to_string(),
                "typing Asha".to_string(),
            ]
        );
    }

    #[test]
    fn commands() {
        let (mut session, mut outbound, recorder) = session(Some("listing-42"));
        drain(&mut outbound);
        session.handle_line("/typing");
        let sent = drain(&mut outbound);
        assert_eq!(
            sent,
            vec![Envelope::new(
                "typing",
                json!({"roomId": "listing-42", "userId": "u-1", "userName": "Ravi"})
            )]
        );

        session.handle_line("/status");
        session.handle_line("/bogus");
        assert_eq!(session.handle_line("/quit"), Control::Quit);
        let lines = recorder.lines();
        assert!(lines[0].starts_with("info connection #"));
        assert!(lines[0].ends_with("connected; room: listing-42"));
        assert_eq!(lines[1], "error Unknown command: /bogus");
    }
}
