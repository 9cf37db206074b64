/// Shared types for the messaging layer
use crate::ids::{MessageId, PostId, UserId};
use serde::{Deserialize, Serialize};

/// Real-time events streamed over SSE (/events endpoint)
///
/// Receivers treat every event as "something changed" and re-fetch; the
/// fields only decide which users an event concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessengerEvent {
    /// A message was stored
    NewMessage {
        message_id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        post_id: PostId,
    },
    /// A thread was deleted by one of its participants
    ConversationDeleted {
        deleted_by: UserId,
        counterpart_id: UserId,
        post_id: PostId,
    },
}

impl MessengerEvent {
    /// Whether the event should wake `user`'s subscription
    pub fn targets(&self, user: &UserId) -> bool {
        match self {
            MessengerEvent::NewMessage { receiver_id, .. } => receiver_id == user,
            MessengerEvent::ConversationDeleted { counterpart_id, .. } => counterpart_id == user,
        }
    }

    /// Whether `user` took part in the event at all, used to scope SSE streams
    pub fn involves(&self, user: &UserId) -> bool {
        match self {
            MessengerEvent::NewMessage {
                sender_id,
                receiver_id,
                ..
            } => sender_id == user || receiver_id == user,
            MessengerEvent::ConversationDeleted {
                deleted_by,
                counterpart_id,
                ..
            } => deleted_by == user || counterpart_id == user,
        }
    }
}
