//! Room membership tied to a consumer's lifetime.

use crate::connection::Connection;
use crate::events::{JOIN_ROOM, LEAVE_ROOM};

/// At most one joined room on the shared connection.
///
/// Feed it the currently available connection and room id whenever either
/// changes.  It emits `joinRoom` once per (connection, room) pair and always
/// emits the matching `leaveRoom` before joining anything else.  Dropping
/// the membership leaves.
#[derive(Debug, Default)]
pub struct RoomMembership {
    joined: Option<(Connection, String)>,
}

impl RoomMembership {
    /// A membership that has not joined anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A membership that joins `room_id` if both inputs are available.
    pub fn join(connection: Option<&Connection>, room_id: Option<&str>) -> Self {
        let mut membership = Self::new();
        membership.update(connection, room_id);
        membership
    }

    /// The joined room, if any.
    pub fn room_id(&self) -> Option<&str> {
        self.joined.as_ref().map(|(_, room)| room.as_str())
    }

    /// Reconcile with the current inputs.
    ///
    /// An absent connection or an empty room id means "no membership".
    pub fn update(&mut self, connection: Option<&Connection>, room_id: Option<&str>) {
        let room_id = room_id.filter(|room| !room.is_empty());
        if let (Some(connection), Some(room_id), Some((current, joined))) =
            (connection, room_id, self.joined.as_ref())
        {
            if connection.same_as(current) && room_id == joined {
                return;
            }
        }
        self.leave();
        let (Some(connection), Some(room_id)) = (connection, room_id) else {
            return;
        };
        match connection.emit(JOIN_ROOM, room_id) {
            Ok(()) => {
                tracing::debug!(room = room_id, connection = connection.id(), "joined room");
                self.joined = Some((connection.clone(), room_id.to_string()));
            }
            Err(err) => {
                tracing::warn!(room = room_id, error = %err, "could not join room");
            }
        }
    }

    /// Leave the joined room, if any.
    pub fn leave(&mut self) {
        if let Some((connection, room_id)) = self.joined.take() {
            if let Err(err) = connection.emit(LEAVE_ROOM, &room_id) {
                tracing::debug!(room = %room_id, error = %err, "could not leave room");
            } else {
                tracing::debug!(room = %room_id, connection = connection.id(), "left room");
            }
        }
    }
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::types::Envelope;

    fn drain(outbound: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(envelope) = outbound.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }

    #[test]
    fn mount_then_unmount_pairs_join_and_leave() {
        let (connection, mut outbound) = Connection::detached();
        let membership = RoomMembership::join(Some(&connection), Some("listing-42"));
        assert_eq!(membership.room_id(), Some("listing-42"));
        assert_eq!(
            drain(&mut outbound),
            vec![Envelope::new("joinRoom", json!("listing-42"))]
        );

        drop(membership);
        assert_eq!(
            drain(&mut outbound),
            vec![Envelope::new("leaveRoom", json!("listing-42"))]
        );
    }

    #[test]
    fn nothing_without_connection_or_room() {
        let (connection, mut outbound) = Connection::detached();
        let mut membership = RoomMembership::new();
        membership.update(None, Some("listing-42"));
        membership.update(Some(&connection), None);
        membership.update(Some(&connection), Some(""));
        assert!(membership.room_id().is_none());
        drop(membership);
        assert!(drain(&mut outbound).is_empty());
    }

    #[test]
    fn same_inputs_do_not_rejoin() {
        let (connection, mut outbound) = Connection::detached();
        let mut membership = RoomMembership::join(Some(&connection), Some("a"));
        membership.update(Some(&connection), Some("a"));
        membership.update(Some(&connection.clone()), Some("a"));
        assert_eq!(drain(&mut outbound).len(), 1);
    }

    #[test]
    fn switching_rooms_leaves_first() {
        let (connection, mut outbound) = Connection::detached();
        let mut membership = RoomMembership::join(Some(&connection), Some("a"));
        membership.update(Some(&connection), Some("b"));
        assert_eq!(
            drain(&mut outbound),
            vec![
                Envelope::new("joinRoom", json!("a")),
                Envelope::new("leaveRoom", json!("a")),
                Envelope::new("joinRoom", json!("b")),
            ]
        );
    }

    #[test]
    fn losing_the_connection_leaves() {
        let (connection, mut outbound) = Connection::detached();
        let mut membership = RoomMembership::join(Some(&connection), Some("a"));
        membership.update(None, Some("a"));
        assert!(membership.room_id().is_none());
        assert_eq!(
            drain(&mut outbound),
            vec![
                Envelope::new("joinRoom", json!("a")),
                Envelope::new("leaveRoom", json!("a")),
            ]
        );
    }

    proptest! {
        #[test]
        fn joins_and_leaves_are_paired(
            steps in proptest::collection::vec(
                (any::<bool>(), proptest::option::of(prop_oneof![
                    Just(""), Just("a"), Just("b"), Just("listing-42")
                ])),
                0..32,
            )
        ) {
            let (connection, mut outbound) = Connection::detached();
            let mut membership = RoomMembership::new();
            for (available, room) in &steps {
                let connection = available.then_some(&connection);
                membership.update(connection, *room);
            }
            drop(membership);

            let mut open: Option<String> = None;
            let mut balance: HashMap<String, i64> = HashMap::new();
            for envelope in drain(&mut outbound) {
                let room = envelope.data.as_str().unwrap_or_default().to_string();
                match envelope.event.as_str() {
                    "joinRoom" => {
                        prop_assert!(open.is_none(), "joined {} while in {:?}", room, open);
                        open = Some(room.clone());
                        *balance.entry(room).or_default() += 1;
                    }
                    "leaveRoom" => {
                        prop_assert_eq!(open.take(), Some(room.clone()));
                        *balance.entry(room).or_default() -= 1;
                    }
                    other => prop_assert!(false, "unexpected event {}", other),
                }
            }
            prop_assert!(open.is_none());
            prop_assert!(balance.values().all(|n| *n == 0));
        }
    }
}
