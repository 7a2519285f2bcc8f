//! Room-scoped chat on the shared connection.
//!
//! [`ChatRoom`] is the sending side: it holds a room membership and emits
//! messages and typing signals into the room.  [`ChatPanel`] adds the
//! receiving side: it subscribes to `message` and `typing`, keeps the
//! messages for the displayed room, and drives a [`TypingIndicator`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::connection::Connection;
use crate::error::Result;
use crate::events::{MESSAGE, TYPING};
use crate::multiplex::Subscription;
use crate::room::RoomMembership;
use crate::types::{ChatMessage, ChatSender, SendMessagePayload, TypingSignal};
use crate::utils::time::now;

/// How long a typing indicator stays up without a renewal.
pub const TYPING_WINDOW: Duration = Duration::from_secs(3);

////////////////////////////////////////// ChatRoom /////////////////////////////////////////

/// Joins a room and sends into it.
#[derive(Debug)]
pub struct ChatRoom {
    connection: Option<Connection>,
    room_id: Option<String>,
    sender: Option<ChatSender>,
    membership: RoomMembership,
}

impl ChatRoom {
    pub fn new(
        connection: Option<&Connection>,
        room_id: Option<&str>,
        sender: Option<ChatSender>,
    ) -> Self {
        let room_id = room_id.filter(|r| !r.is_empty()).map(str::to_string);
        let membership = RoomMembership::join(connection, room_id.as_deref());
        Self {
            connection: connection.cloned(),
            room_id,
            sender,
            membership,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn sender(&self) -> Option<&ChatSender> {
        self.sender.as_ref()
    }

    /// Leave the current room and join `room_id`.
    pub fn set_room(&mut self, room_id: Option<&str>) {
        self.room_id = room_id.filter(|r| !r.is_empty()).map(str::to_string);
        self.membership
            .update(self.connection.as_ref(), self.room_id.as_deref());
    }

    pub fn set_connection(&mut self, connection: Option<&Connection>) {
        self.connection = connection.cloned();
        self.membership
            .update(self.connection.as_ref(), self.room_id.as_deref());
    }

    /// Emit `content` to the room, stamped with the current time.
    ///
    /// Does nothing without a room or a connection.
    pub fn send_message(&self, content: &str) -> Result<()> {
        let (Some(connection), Some(room_id)) = (&self.connection, &self.room_id) else {
            return Ok(());
        };
        let payload = SendMessagePayload {
            room_id: room_id.clone(),
            content: content.to_string(),
            sender_id: self.sender.as_ref().map(|s| s.sender_id.clone()),
            sender_name: self.sender.as_ref().and_then(|s| s.sender_name.clone()),
            timestamp: Some(now()),
        };
        connection.emit(MESSAGE, &payload)
    }

    /// Tell the room this user is typing.
    pub fn send_typing(&self) -> Result<()> {
        let (Some(connection), Some(room_id)) = (&self.connection, &self.room_id) else {
            return Ok(());
        };
        let signal = TypingSignal {
            room_id: room_id.clone(),
            user_id: self
                .sender
                .as_ref()
                .map(|s| s.sender_id.clone())
                .unwrap_or_default(),
            user_name: self
                .sender
                .as_ref()
                .and_then(|s| s.sender_name.clone())
                .filter(|name| !name.is_empty()),
        };
        connection.emit(TYPING, &signal)
    }
}

/////////////////////////////////////// TypingIndicator /////////////////////////////////////

/// A "someone is typing" label that clears itself after [`TYPING_WINDOW`].
#[derive(Debug, Clone, Default)]
pub struct TypingIndicator {
    current: Option<(String, Instant)>,
}

impl TypingIndicator {
    /// Show `label` and restart the quiet window.
    pub fn renew(&mut self, label: impl Into<String>) {
        self.current = Some((label.into(), Instant::now() + TYPING_WINDOW));
    }

    /// The label, unless the window has elapsed.
    pub fn label(&self) -> Option<&str> {
        match &self.current {
            Some((label, until)) if Instant::now() < *until => Some(label),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

////////////////////////////////////////// ChatPanel ////////////////////////////////////////

/// Something the panel accepted for display.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Message(ChatMessage),
    Typing(String),
}

/// What a chat panel currently shows.
#[derive(Debug, Default)]
pub struct PanelState {
    room_id: Option<String>,
    current_user: Option<String>,
    messages: Vec<ChatMessage>,
    typing: TypingIndicator,
}

impl PanelState {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn typing_label(&self) -> Option<&str> {
        self.typing.label()
    }

    fn switch_room(&mut self, room_id: Option<String>) {
        if self.room_id != room_id {
            self.room_id = room_id;
            self.messages.clear();
            self.typing.clear();
        }
    }

    fn receive_message(&mut self, mut message: ChatMessage) -> Option<PanelEvent> {
        if self.room_id.as_deref() != Some(message.room_id.as_str()) {
            return None;
        }
        if message.timestamp.is_none() {
            message.timestamp = Some(now());
        }
        self.messages.push(message.clone());
        Some(PanelEvent::Message(message))
    }

    fn receive_typing(&mut self, signal: TypingSignal) -> Option<PanelEvent> {
        if self.room_id.as_deref() != Some(signal.room_id.as_str()) {
            return None;
        }
        if self.current_user.as_deref() == Some(signal.user_id.as_str()) {
            return None;
        }
        let label = signal.label().to_string();
        self.typing.renew(label.clone());
        Some(PanelEvent::Typing(label))
    }
}

type Observer = Arc<Mutex<Option<Box<dyn FnMut(PanelEvent) + Send>>>>;

/// A chat room plus the inbound side: messages and typing for the displayed room.
pub struct ChatPanel {
    room: ChatRoom,
    state: Arc<Mutex<PanelState>>,
    observer: Observer,
    messages: Subscription<ChatMessage>,
    typing: Subscription<TypingSignal>,
}

impl ChatPanel {
    pub fn new(
        connection: Option<&Connection>,
        room_id: Option<&str>,
        sender: Option<ChatSender>,
    ) -> Self {
        let room = ChatRoom::new(connection, room_id, sender);
        let state = Arc::new(Mutex::new(PanelState {
            room_id: room.room_id().map(str::to_string),
            current_user: room.sender().map(|s| s.sender_id.clone()),
            ..PanelState::default()
        }));
        let observer: Observer = Arc::new(Mutex::new(None));

        let messages = {
            let state = Arc::clone(&state);
            let observer = Arc::clone(&observer);
            Subscription::on(connection, MESSAGE, move |message: ChatMessage| {
                let accepted = lock(&state).receive_message(message);
                notify(&observer, accepted);
            })
        };
        let typing = {
            let state = Arc::clone(&state);
            let observer = Arc::clone(&observer);
            Subscription::on(connection, TYPING, move |signal: TypingSignal| {
                let accepted = lock(&state).receive_typing(signal);
                notify(&observer, accepted);
            })
        };

        Self {
            room,
            state,
            observer,
            messages,
            typing,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room.room_id()
    }

    /// Switch rooms.  Messages and the typing indicator reset.
    pub fn set_room(&mut self, room_id: Option<&str>) {
        self.room.set_room(room_id);
        lock(&self.state).switch_room(self.room.room_id().map(str::to_string));
    }

    pub fn set_connection(&mut self, connection: Option<&Connection>) {
        self.room.set_connection(connection);
        self.messages.attach(connection);
        self.typing.attach(connection);
    }

    /// Call `observer` for every message or typing signal the panel accepts.
    pub fn observe(&self, observer: impl FnMut(PanelEvent) + Send + 'static) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(observer));
    }

    /// Send the trimmed input; blank input is ignored.
    pub fn submit(&self, input: &str) -> Result<()> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.room.send_message(text)
    }

    /// The user edited their input.
    pub fn input_changed(&self) -> Result<()> {
        self.room.send_typing()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages().to_vec()
    }

    pub fn typing_label(&self) -> Option<String> {
        lock(&self.state).typing_label().map(str::to_string)
    }

    /// True when the message was sent by this panel's user.
    pub fn is_mine(&self, message: &ChatMessage) -> bool {
        self.room
            .sender()
            .is_some_and(|s| s.sender_id == message.sender_id)
    }

    /// Input is disabled without a room or without a live connection.
    pub fn is_disabled(&self) -> bool {
        let connected = self
            .room
            .connection
            .as_ref()
            .is_some_and(Connection::is_connected);
        self.room.room_id().is_none() || !connected
    }
}

fn lock(state: &Mutex<PanelState>) -> MutexGuard<'_, PanelState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn notify(observer: &Observer, event: Option<PanelEvent>) {
    if let Some(event) = event {
        if let Some(observer) = observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            observer(event);
        }
    }
}
