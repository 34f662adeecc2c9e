// Multi-room chat relayed through the broadcast registry

use crate::broadcast::{BroadcastError, BroadcastRegistry, Connection, GroupKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const USER_JOINED_EVENT: &str = "UserJoined";
pub const USER_LEFT_EVENT: &str = "UserLeft";
pub const RECEIVE_MESSAGE_EVENT: &str = "ReceiveMessage";

/// Payload of `UserJoined` / `UserLeft`
#[derive(Debug, Clone, Serialize)]
pub struct RoomPresence {
    pub user: String,
    pub room: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `ReceiveMessage`
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub user: String,
    pub message: String,
    pub room: String,
    pub timestamp: DateTime<Utc>,
}

/// Room-scoped join/leave/send on top of the registry
#[derive(Clone)]
pub struct ChatRelay {
    registry: Arc<BroadcastRegistry>,
}

impl ChatRelay {
    pub fn new(registry: Arc<BroadcastRegistry>) -> Self {
        Self { registry }
    }

    /// Join a room and announce it to the room (joiner included)
    pub fn join_room(&self, connection: &Connection, room: &str) -> Result<(), ChatError> {
        let key = room_key(connection, room)?;
        let user = connection.display_name();

        self.registry.join(connection.id, &key);
        info!(connection_id = %connection.id, user = %user, room = %room, "User joined room");

        self.registry
            .publish(&key, USER_JOINED_EVENT, &presence(user, room))?;
        Ok(())
    }

    /// Leave a room and announce it to the remaining members
    pub fn leave_room(&self, connection: &Connection, room: &str) -> Result<(), ChatError> {
        let key = room_key(connection, room)?;
        let user = connection.display_name();

        self.registry.leave(connection.id, &key);
        info!(connection_id = %connection.id, user = %user, room = %room, "User left room");

        self.registry
            .publish(&key, USER_LEFT_EVENT, &presence(user, room))?;
        Ok(())
    }

    /// Send a trimmed message to the room's members only
    ///
    /// Membership is not required to send.
    pub fn send_message(
        &self,
        connection: &Connection,
        room: &str,
        message: &str,
    ) -> Result<(), ChatError> {
        let key = room_key(connection, room)?;

        let text = message.trim();
        if text.is_empty() {
            warn!(connection_id = %connection.id, room = %room, "Rejected empty chat message");
            return Err(ChatError::EmptyMessage);
        }

        let chat_message = ChatMessage {
            user: connection.display_name().to_string(),
            message: text.to_string(),
            room: room.to_string(),
            timestamp: Utc::now(),
        };

        let report = self
            .registry
            .publish(&key, RECEIVE_MESSAGE_EVENT, &chat_message)?;
        info!(
            user = %chat_message.user,
            room = %room,
            delivered = report.delivered,
            "Chat message relayed"
        );
        Ok(())
    }
}

fn room_key(connection: &Connection, room: &str) -> Result<GroupKey, ChatError> {
    if room.trim().is_empty() {
        warn!(connection_id = %connection.id, "Rejected empty room name");
        return Err(ChatError::EmptyRoom);
    }
    Ok(GroupKey::room(room))
}

fn presence(user: &str, room: &str) -> RoomPresence {
    RoomPresence {
        user: user.to_string(),
        room: room.to_string(),
        timestamp: Utc::now(),
    }
}

/// Chat operation errors
#[derive(Debug, PartialEq, Clone)]
pub enum ChatError {
    EmptyRoom,
    EmptyMessage,
    Broadcast(BroadcastError),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::EmptyRoom => write!(f, "Room name cannot be empty"),
            ChatError::EmptyMessage => write!(f, "Message cannot be empty"),
            ChatError::Broadcast(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<BroadcastError> for ChatError {
    fn from(e: BroadcastError) -> Self {
        ChatError::Broadcast(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::OutboundEvent;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::error::TryRecvError;

    fn setup() -> (Arc<BroadcastRegistry>, ChatRelay) {
        let registry = Arc::new(BroadcastRegistry::new(16));
        let relay = ChatRelay::new(Arc::clone(&registry));
        (registry, relay)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<OutboundEvent>>) -> Vec<Arc<OutboundEvent>> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_join_announces_to_room() {
        let (registry, relay) = setup();
        let (alice, mut alice_rx) = registry.register(Some("alice".to_string()));

        relay.join_room(&alice, "lobby").unwrap();

        let events = drain(&mut alice_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, USER_JOINED_EVENT);
        assert_eq!(events[0].data["user"], "alice");
        assert_eq!(events[0].data["room"], "lobby");
        assert!(events[0].data.get("timestamp").is_some());
    }

    #[test]
    fn test_leave_announces_to_remaining_members() {
        let (registry, relay) = setup();
        let (alice, mut alice_rx) = registry.register(Some("alice".to_string()));
        let (bob, mut bob_rx) = registry.register(Some("bob".to_string()));
        relay.join_room(&alice, "lobby").unwrap();
        relay.join_room(&bob, "lobby").unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        relay.leave_room(&bob, "lobby").unwrap();

        let events = drain(&mut alice_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, USER_LEFT_EVENT);
        assert_eq!(events[0].data["user"], "bob");
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_message_is_trimmed_and_room_scoped() {
        let (registry, relay) = setup();
        let (alice, mut alice_rx) = registry.register(Some("alice".to_string()));
        let (carol, mut carol_rx) = registry.register(Some("carol".to_string()));
        relay.join_room(&alice, "lobby").unwrap();
        relay.join_room(&carol, "garage").unwrap();
        drain(&mut alice_rx);
        drain(&mut carol_rx);

        relay.send_message(&alice, "lobby", "  hello there  ").unwrap();

        let events = drain(&mut alice_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, RECEIVE_MESSAGE_EVENT);
        assert_eq!(events[0].data["message"], "hello there");
        assert_eq!(events[0].data["user"], "alice");
        assert_eq!(events[0].data["room"], "lobby");
        assert!(matches!(carol_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_invalid_messages_rejected_without_publishing() {
        let (registry, relay) = setup();
        let (alice, mut alice_rx) = registry.register(Some("alice".to_string()));
        relay.join_room(&alice, "room1").unwrap();
        drain(&mut alice_rx);

        assert_eq!(relay.send_message(&alice, "", "hi"), Err(ChatError::EmptyRoom));
        assert_eq!(
            relay.send_message(&alice, "room1", "   "),
            Err(ChatError::EmptyMessage)
        );
        assert_eq!(relay.join_room(&alice, "  "), Err(ChatError::EmptyRoom));
        assert_eq!(relay.leave_room(&alice, ""), Err(ChatError::EmptyRoom));

        assert!(drain(&mut alice_rx).is_empty());
        assert!(registry.is_member(alice.id, &GroupKey::room("room1")));
    }

    #[test]
    fn test_anonymous_user_label() {
        let (registry, relay) = setup();
        let (anon, mut anon_rx) = registry.register(None);
        relay.join_room(&anon, "lobby").unwrap();
        relay.send_message(&anon, "lobby", "hi").unwrap();

        let events = drain(&mut anon_rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.data["user"] == "Anonymous"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ChatError::EmptyRoom.to_string(), "Room name cannot be empty");
        assert_eq!(ChatError::EmptyMessage.to_string(), "Message cannot be empty");
    }
}
