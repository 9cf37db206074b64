/// Message persistence: one flat table of messages stored in sled DB
/// Threads are never stored; they are derived from these rows on read
use crate::error::{LostFoundError, Result};
use crate::ids::{MessageId, PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub post_id: PostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    fn involves(&self, user: &UserId) -> bool {
        &self.sender_id == user || &self.receiver_id == user
    }

    /// Same posting, and the two parties are `a` and `b` in either direction
    fn between(&self, a: &UserId, b: &UserId, post_id: PostId) -> bool {
        self.post_id == post_id
            && ((&self.sender_id == a && &self.receiver_id == b)
                || (&self.sender_id == b && &self.receiver_id == a))
    }
}

pub struct MessageStore {
    db: sled::Db,
}

impl MessageStore {
    /// Create message store
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("messages.db");
        let db = sled::open(&db_path).map_err(|e| {
            LostFoundError::Storage(format!("Failed to open messages DB: {}", e))
        })?;

        Ok(Self { db })
    }

    /// Append one message; id and timestamp are assigned here
    pub fn insert(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        post_id: PostId,
        content: &str,
    ) -> Result<StoredMessage> {
        let msg = StoredMessage {
            id: MessageId(self.db.generate_id()? + 1),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            post_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_vec(&msg).map_err(LostFoundError::Serialization)?;

        self.db
            .insert(msg.id.to_key(), value)
            .map_err(|e| LostFoundError::Storage(format!("Failed to save message: {}", e)))?;

        Ok(msg)
    }

    /// Every message the user sent or received, newest first
    pub fn for_user(&self, user: &UserId) -> Result<Vec<StoredMessage>> {
        let mut messages = Vec::new();

        for entry in self.db.iter() {
            let (_, value) = entry?;
            if let Ok(msg) = serde_json::from_slice::<StoredMessage>(&value) {
                if msg.involves(user) {
                    messages.push(msg);
                }
            }
        }

        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        debug!("Fetched {} messages for {}", messages.len(), user);
        Ok(messages)
    }

    /// Remove every message of one thread, whichever side sent it
    pub fn delete_thread(
        &self,
        viewer: &UserId,
        counterpart: &UserId,
        post_id: PostId,
    ) -> Result<usize> {
        let mut doomed = Vec::new();
        for entry in self.db.iter() {
            let (key, value) = entry?;
            if let Ok(msg) = serde_json::from_slice::<StoredMessage>(&value) {
                if msg.between(viewer, counterpart, post_id) {
                    doomed.push(key);
                }
            }
        }

        let mut batch = sled::Batch::default();
        for key in &doomed {
            batch.remove(key.clone());
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| LostFoundError::Storage(format!("Failed to delete thread: {}", e)))?;

        debug!(
            "Deleted {} messages for thread {}:{}",
            doomed.len(),
            post_id,
            counterpart
        );
        Ok(doomed.len())
    }

    /// Get message count
    pub fn count(&self) -> usize {
        self.db.len()
    }
}

impl Clone for MessageStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn test_for_user_filters_and_orders_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = MessageStore::new(temp_dir.path()).unwrap();

        let first = store.insert(&uid("a"), &uid("b"), PostId(1), "hi").unwrap();
        let second = store.insert(&uid("b"), &uid("a"), PostId(1), "hello").unwrap();
        store.insert(&uid("c"), &uid("d"), PostId(1), "other").unwrap();

        let for_a = store.for_user(&uid("a")).unwrap();
        let ids: Vec<_> = for_a.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_delete_thread_is_bidirectional_and_scoped() {
        let temp_dir = TempDir::new().unwrap();
        let store = MessageStore::new(temp_dir.path()).unwrap();

        store.insert(&uid("a"), &uid("b"), PostId(1), "1").unwrap();
        store.insert(&uid("b"), &uid("a"), PostId(1), "2").unwrap();
        store.insert(&uid("a"), &uid("b"), PostId(2), "other post").unwrap();
        store.insert(&uid("a"), &uid("c"), PostId(1), "other person").unwrap();

        let removed = store.delete_thread(&uid("a"), &uid("b"), PostId(1)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count(), 2);

        let again = store.delete_thread(&uid("b"), &uid("a"), PostId(1)).unwrap();
        assert_eq!(again, 0);
    }
}
