//! Live record updates pushed by the server.

use crate::connection::Connection;
use crate::events::LIVE_UPDATE;
use crate::multiplex::Subscription;
use crate::types::LiveUpdate;

/// Subscribe `handler` to `live:update`.
///
/// Keep the returned subscription alive for as long as updates are wanted.
pub fn live_updates(
    connection: Option<&Connection>,
    handler: impl FnMut(LiveUpdate) + Send + 'static,
) -> Subscription<LiveUpdate> {
    live_updates_on(connection, LIVE_UPDATE, handler)
}

/// Subscribe `handler` to live updates published under a custom event name.
pub fn live_updates_on(
    connection: Option<&Connection>,
    event: &str,
    handler: impl FnMut(LiveUpdate) + Send + 'static,
) -> Subscription<LiveUpdate> {
    Subscription::on(connection, event, handler)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::types::{Envelope, LiveUpdateAction};

    #[test]
    fn default_event_name() {
        let (connection, _outbound) = Connection::detached();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = live_updates(Some(&connection), move |update| {
            sink.lock().unwrap().push(update);
        });
        assert_eq!(subscription.event(), "live:update");

        connection.dispatch(&Envelope::new(
            "live:update",
            json!({"entity": "listing", "id": "42", "action": "updated", "data": {"price": 1200}}),
        ));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].action, LiveUpdateAction::Updated);
        assert_eq!(seen[0].data, Some(json!({"price": 1200})));
    }

    #[test]
    fn custom_event_name_and_independent_subscribers() {
        let (connection, _outbound) = Connection::detached();
        let count = Arc::new(Mutex::new(0));
        let a = Arc::clone(&count);
        let b = Arc::clone(&count);
        let _first = live_updates_on(Some(&connection), "favorites:changed", move |_| {
            *a.lock().unwrap() += 1;
        });
        let _second = live_updates_on(Some(&connection), "favorites:changed", move |_| {
            *b.lock().unwrap() += 1;
        });

        connection.dispatch(&Envelope::new(
            "favorites:changed",
            json!({"entity": "favorite", "id": "7", "action": "deleted"}),
        ));
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
