//! Room subscriptions and their handlers.

use std::collections::HashMap;
use std::sync::Arc;

use roomchat_shared::{Message, RoomId};

/// Receives every message delivered on a room's topic.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message addressed to room {found}, expected {expected}")]
    RoomMismatch { expected: RoomId, found: RoomId },
}

/// Decode a `MESSAGE` body received on `room_id`'s topic.
///
/// `sender` and `content` are required. A missing `roomId` is taken from the
/// subscription; a different one is rejected.
pub fn decode_message(room_id: &str, body: &str) -> Result<Message, DecodeError> {
    let mut message: Message = serde_json::from_str(body)?;
    if message.room_id.is_empty() {
        message.room_id = room_id.to_string();
    } else if message.room_id != room_id {
        return Err(DecodeError::RoomMismatch {
            expected: room_id.to_string(),
            found: message.room_id,
        });
    }
    Ok(message)
}

/// One broker-level subscription.
#[derive(Clone)]
pub struct Subscription {
    pub room_id: RoomId,
    /// Broker subscription id, valid only on the connection that issued it.
    pub id: String,
    handler: MessageHandler,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("room_id", &self.room_id)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// At most one subscription per room.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_room: HashMap<RoomId, Subscription>,
    room_by_id: HashMap<String, RoomId>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh broker subscription id.
    pub fn allocate_id(&mut self) -> String {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, room_id: &str, id: String, handler: MessageHandler) {
        self.room_by_id.insert(id.clone(), room_id.to_string());
        if let Some(old) = self.by_room.insert(
            room_id.to_string(),
            Subscription {
                room_id: room_id.to_string(),
                id,
                handler,
            },
        ) {
            self.room_by_id.remove(&old.id);
        }
    }

    /// Swap the handler of an existing subscription, keeping its broker id.
    /// Returns false if the room has no subscription.
    pub fn replace_handler(&mut self, room_id: &str, handler: MessageHandler) -> bool {
        match self.by_room.get_mut(room_id) {
            Some(sub) => {
                sub.handler = handler;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, room_id: &str) -> Option<Subscription> {
        let sub = self.by_room.remove(room_id)?;
        self.room_by_id.remove(&sub.id);
        Some(sub)
    }

    /// Room and handler for a broker subscription id.
    pub fn route(&self, subscription_id: &str) -> Option<(RoomId, MessageHandler)> {
        let room_id = self.room_by_id.get(subscription_id)?;
        let sub = self.by_room.get(room_id)?;
        Some((sub.room_id.clone(), sub.handler.clone()))
    }

    /// Subscribed rooms, sorted.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.by_room.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Drop every subscription, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.by_room.len();
        self.by_room.clear();
        self.room_by_id.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (MessageHandler, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: MessageHandler = Arc::new(move |m| sink.lock().unwrap().push(m));
        (handler, seen)
    }

    #[test]
    fn routes_by_subscription_id() {
        let mut registry = SubscriptionRegistry::new();
        let (handler, seen) = recorder();
        let id = registry.allocate_id();
        assert_eq!(id, "sub-0");
        registry.insert("room1", id, handler);

        let (room, handler) = registry.route("sub-0").unwrap();
        assert_eq!(room, "room1");
        handler(Message::new("bob", "hi", "room1"));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(registry.route("sub-1").is_none());
    }

    #[test]
    fn replace_handler_keeps_id() {
        let mut registry = SubscriptionRegistry::new();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        let id = registry.allocate_id();
        registry.insert("room1", id, first);

        assert!(registry.replace_handler("room1", second));
        assert!(!registry.replace_handler("room2", Arc::new(|_| {})));
        let (room, handler) = registry.route("sub-0").unwrap();
        assert_eq!(room, "room1");
        handler(Message::new("bob", "hi", "room1"));
        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let mut registry = SubscriptionRegistry::new();
        for room in ["b", "a", "c"] {
            let id = registry.allocate_id();
            registry.insert(room, id, Arc::new(|_| {}));
        }
        assert_eq!(registry.rooms(), vec!["a", "b", "c"]);

        let removed = registry.remove("b").unwrap();
        assert!(registry.route(&removed.id).is_none());
        assert!(registry.remove("b").is_none());

        assert_eq!(registry.clear(), 2);
        assert!(registry.rooms().is_empty());
    }

    #[test]
    fn decode_fills_in_room() {
        let msg = decode_message("room1", r#"{"sender":"bob","content":"hi"}"#).unwrap();
        assert_eq!(msg, Message::new("bob", "hi", "room1"));
    }

    #[test]
    fn decode_rejects_bad_bodies() {
        assert!(matches!(
            decode_message("room1", "not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_message("room1", r#"{"content":"hi"}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_message("room1", r#"{"sender":"bob","content":"hi","roomId":"room2"}"#),
            Err(DecodeError::RoomMismatch { .. })
        ));
    }
}
