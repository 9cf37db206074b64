/// Message fetch/send/delete plus push notifications over a broadcast channel
use crate::conversation::{
    derive_conversations, ChatMessage, ConversationThread, MessageRecord, PostJoin, ProfileJoin,
};
use crate::error::{LostFoundError, Result};
use crate::ids::{PostId, UserId};
use crate::message_store::MessageStore;
use crate::messenger_types::MessengerEvent;
use crate::models::Profile;
use crate::post_store::PostStore;
use crate::profile_store::ProfileStore;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ChatService {
    messages: MessageStore,
    profiles: ProfileStore,
    posts: PostStore,
    events: broadcast::Sender<MessengerEvent>,
}

impl ChatService {
    pub fn new(
        messages: MessageStore,
        profiles: ProfileStore,
        posts: PostStore,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            messages,
            profiles,
            posts,
            events,
        }
    }

    /// Messages touching `user`, newest first, joined with display fields.
    /// Joins that cannot be resolved are left empty.
    pub fn fetch_messages(&self, user: &UserId) -> Result<Vec<MessageRecord>> {
        let rows = self.messages.for_user(user)?;

        let mut profiles: HashMap<UserId, Option<ProfileJoin>> = HashMap::new();
        let mut posts: HashMap<PostId, Option<PostJoin>> = HashMap::new();
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let sender = self.profile_join(&mut profiles, &row.sender_id);
            let receiver = self.profile_join(&mut profiles, &row.receiver_id);
            let post = match posts.get(&row.post_id) {
                Some(cached) => cached.clone(),
                None => {
                    let join = match self.posts.get(row.post_id) {
                        Ok(found) => found.map(|p| PostJoin {
                            title: p.title,
                            post_type: p.post_type,
                        }),
                        Err(e) => {
                            warn!("Post join failed for {}: {}", row.post_id, e);
                            None
                        }
                    };
                    posts.insert(row.post_id, join.clone());
                    join
                }
            };

            records.push(MessageRecord {
                id: row.id,
                sender_id: row.sender_id,
                receiver_id: row.receiver_id,
                post_id: row.post_id,
                content: row.content,
                created_at: row.created_at,
                sender,
                receiver,
                post,
            });
        }

        Ok(records)
    }

    fn profile_join(
        &self,
        cache: &mut HashMap<UserId, Option<ProfileJoin>>,
        id: &UserId,
    ) -> Option<ProfileJoin> {
        if let Some(cached) = cache.get(id) {
            return cached.clone();
        }
        let join = match self.profiles.get(id) {
            Ok(found) => found.map(|p| ProfileJoin {
                name: p.name,
                avatar_url: p.avatar_url,
                email: p.email,
            }),
            Err(e) => {
                warn!("Profile join failed for {}: {}", id, e);
                None
            }
        };
        cache.insert(id.clone(), join.clone());
        join
    }

    /// Full fetch-and-derive cycle for one user
    pub async fn conversations(&self, user: &UserId) -> Result<Vec<ConversationThread>> {
        let records = self.fetch_messages(user)?;
        let threads = derive_conversations(user, &records);
        debug!(
            "Derived {} conversations from {} messages for {}",
            threads.len(),
            records.len(),
            user
        );
        Ok(threads)
    }

    pub async fn send_message(
        &self,
        sender: &Profile,
        receiver_id: &UserId,
        post_id: PostId,
        text: &str,
    ) -> Result<ChatMessage> {
        if text.trim().is_empty() {
            return Err(LostFoundError::InvalidArgument(
                "message text must not be empty".to_string(),
            ));
        }
        if &sender.id == receiver_id {
            return Err(LostFoundError::InvalidArgument(
                "cannot message yourself".to_string(),
            ));
        }
        if self.posts.get(post_id)?.is_none() {
            return Err(LostFoundError::NotFound(format!("post {}", post_id)));
        }

        let stored = self.messages.insert(&sender.id, receiver_id, post_id, text)?;
        info!(
            "Message {} sent {} -> {} about post {}",
            stored.id, sender.id, receiver_id, post_id
        );

        // No subscribers is not an error
        let _ = self.events.send(MessengerEvent::NewMessage {
            message_id: stored.id,
            sender_id: stored.sender_id.clone(),
            receiver_id: stored.receiver_id.clone(),
            post_id,
        });

        // Prefer the stored profile for display, fall back to the caller's copy
        let display = self.profiles.get(&sender.id).ok().flatten();
        let (sender_name, sender_avatar) = match display {
            Some(p) => (p.name, p.avatar_url),
            None => (sender.name.clone(), sender.avatar_url.clone()),
        };

        Ok(ChatMessage {
            id: stored.id,
            sender_id: stored.sender_id,
            sender_name,
            sender_avatar,
            text: stored.content,
            timestamp: stored.created_at,
        })
    }

    /// Delete one thread in both directions; returns how many messages went
    pub async fn delete_conversation(
        &self,
        viewer: &UserId,
        counterpart: &UserId,
        post_id: PostId,
    ) -> Result<usize> {
        let removed = self.messages.delete_thread(viewer, counterpart, post_id)?;
        info!(
            "Deleted {} messages for conversation {}:{}",
            removed, post_id, counterpart
        );
        let _ = self.events.send(MessengerEvent::ConversationDeleted {
            deleted_by: viewer.clone(),
            counterpart_id: counterpart.clone(),
            post_id,
        });
        Ok(removed)
    }

    /// Raw event feed, used by the SSE endpoint
    pub fn events(&self) -> broadcast::Receiver<MessengerEvent> {
        self.events.subscribe()
    }

    /// Change notifications for one user
    pub fn subscribe(&self, user: &UserId) -> MessageSubscription {
        MessageSubscription {
            user: user.clone(),
            rx: self.events.subscribe(),
        }
    }
}

pub struct MessageSubscription {
    user: UserId,
    rx: broadcast::Receiver<MessengerEvent>,
}

impl MessageSubscription {
    /// Wait until something concerning this user happened.
    /// Returns `false` once the service is gone.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.targets(&self.user) => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed events may have concerned us; a re-fetch is always safe
                    warn!("Subscription for {} lagged {} events", self.user, n);
                    return true;
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }
}
