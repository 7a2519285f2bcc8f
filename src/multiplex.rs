//! Typed, multiplexed event subscriptions on the shared connection.
//!
//! A [`Subscription`] registers exactly one low-level listener per event on
//! a [`Connection`] and routes every delivery through a replaceable handler
//! cell.  Replacing the handler never touches the registration, so the most
//! recently supplied closure always runs.  Any number of subscriptions may
//! share an event name; each fires once per delivery.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::{Connection, ListenerId};

type Handler<T> = Box<dyn FnMut(T) + Send>;

/// A consumer-scoped subscription to one named event.
///
/// Dropping the subscription unregisters its listener.
pub struct Subscription<T> {
    event: String,
    handler: Arc<Mutex<Handler<T>>>,
    attached: Option<(Connection, ListenerId)>,
    _payload: PhantomData<fn(T)>,
}

impl<T: DeserializeOwned + 'static> Subscription<T> {
    /// Create a detached subscription to `event`.
    pub fn new(event: impl Into<String>, handler: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            event: event.into(),
            handler: Arc::new(Mutex::new(Box::new(handler))),
            attached: None,
            _payload: PhantomData,
        }
    }

    /// Create a subscription and attach it to `connection` if one is available.
    pub fn on(
        connection: Option<&Connection>,
        event: impl Into<String>,
        handler: impl FnMut(T) + Send + 'static,
    ) -> Self {
        let mut subscription = Self::new(event, handler);
        subscription.attach(connection);
        subscription
    }

    /// The event this subscription listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// True while a listener is registered on some connection.
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Replace the handler.  The next delivery uses it.
    ///
    /// Must not be called from inside the handler itself.
    pub fn set_handler(&self, handler: impl FnMut(T) + Send + 'static) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Box::new(handler);
    }

    /// Follow the currently available connection.
    ///
    /// `None` unregisters.  The same connection as before is a no-op; a
    /// different one moves the registration.
    pub fn attach(&mut self, connection: Option<&Connection>) {
        if let (Some(next), Some((current, _))) = (connection, self.attached.as_ref()) {
            if next.same_as(current) {
                return;
            }
        }
        self.detach();
        if let Some(next) = connection {
            let id = next.on(
                &self.event,
                Self::listener(Arc::clone(&self.handler), self.event.clone()),
            );
            self.attached = Some((next.clone(), id));
        }
    }

    /// Switch to a different event name, keeping the handler and connection.
    pub fn set_event(&mut self, event: impl Into<String>) {
        let event = event.into();
        if event == self.event {
            return;
        }
        let connection = self.attached.as_ref().map(|(c, _)| c.clone());
        self.detach();
        self.event = event;
        self.attach(connection.as_ref());
    }

    /// Unregister the listener, if any.
    pub fn detach(&mut self) {
        if let Some((connection, id)) = self.attached.take() {
            connection.off(&self.event, id);
        }
    }

    fn listener(
        handler: Arc<Mutex<Handler<T>>>,
        event: String,
    ) -> impl Fn(&Value) + Send + Sync + 'static {
        move |value: &Value| match T::deserialize(value) {
            Ok(payload) => {
                let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
                (*handler)(payload);
            }
            Err(err) => {
                tracing::warn!(event = %event, error = %err, "dropping undecodable payload");
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some((connection, id)) = self.attached.take() {
            connection.off(&self.event, id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("connection", &self.attached.as_ref().map(|(c, _)| c.id()))
            .finish()
    }
}
