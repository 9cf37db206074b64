/// Conversation derivation: flat message rows in, ordered threads out
///
/// There is no conversations table. A thread is whatever set of messages
/// shares a posting and a counterpart, relative to the viewing user, and the
/// whole list is recomputed from a fresh fetch every time.
use crate::ids::{MessageId, PostId, UserId};
use crate::models::{default_avatar_url, PostType};
use crate::reference_card::MessageBody;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const UNKNOWN_NAME: &str = "Unknown";
const UNKNOWN_POST: &str = "Unknown Post";
const PLACEHOLDER_PREFIX: &str = "temp-";

/// Display fields joined from a user's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileJoin {
    pub name: String,
    pub avatar_url: String,
    pub email: String,
}

/// Display fields joined from the posting a message is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostJoin {
    pub title: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
}

/// One fetched message row with its joins; `None` joins mean the join failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub post_id: PostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender: Option<ProfileJoin>,
    pub receiver: Option<ProfileJoin>,
    pub post: Option<PostJoin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadKey {
    pub post_id: PostId,
    pub counterpart_id: UserId,
}

impl ThreadKey {
    pub fn new(post_id: PostId, counterpart_id: UserId) -> Self {
        Self {
            post_id,
            counterpart_id,
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.post_id, self.counterpart_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_avatar: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn body(&self) -> MessageBody {
        MessageBody::parse(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterpart {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
    pub email: String,
}

impl Counterpart {
    fn from_join(id: UserId, join: Option<&ProfileJoin>) -> Self {
        match join {
            Some(p) => Self {
                id,
                name: p.name.clone(),
                avatar: p.avatar_url.clone(),
                email: p.email.clone(),
            },
            None => Self {
                id,
                name: UNKNOWN_NAME.to_string(),
                avatar: String::new(),
                email: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// `key` rendered as a string, or a `temp-` token for placeholders
    pub id: String,
    pub key: ThreadKey,
    pub counterpart: Counterpart,
    pub post_id: PostId,
    pub post_title: String,
    pub post_type: PostType,
    /// Oldest first
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message: String,
    pub unread_count: u32,
}

impl ConversationThread {
    /// Local stand-in for a thread whose first message is not stored yet
    pub fn placeholder(
        counterpart_id: UserId,
        counterpart_name: &str,
        post_id: PostId,
        post_title: &str,
        post_type: PostType,
    ) -> Self {
        let now = Utc::now();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!(
                "{}{}-{}",
                PLACEHOLDER_PREFIX,
                now.timestamp_millis(),
                &nonce[..8]
            ),
            key: ThreadKey::new(post_id, counterpart_id.clone()),
            counterpart: Counterpart {
                id: counterpart_id,
                name: counterpart_name.to_string(),
                avatar: default_avatar_url(counterpart_name),
                email: String::new(),
            },
            post_id,
            post_title: post_title.to_string(),
            post_type,
            messages: Vec::new(),
            created_at: now,
            last_message_at: None,
            last_message: String::new(),
            unread_count: 0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_PREFIX)
    }

    fn refresh_summary(&mut self) {
        match (self.messages.first(), self.messages.last()) {
            (Some(first), Some(last)) => {
                self.created_at = first.timestamp;
                self.last_message_at = Some(last.timestamp);
                self.last_message = last.text.clone();
            }
            _ => {
                self.last_message_at = None;
                self.last_message.clear();
            }
        }
    }
}

/// Group `records` into threads as seen by `viewer`.
///
/// Input order does not matter. Messages inside a thread come out oldest
/// first (stable on equal timestamps) and threads come out most recently
/// active first (stable on equal timestamps).
pub fn derive_conversations(
    viewer: &UserId,
    records: &[MessageRecord],
) -> Vec<ConversationThread> {
    let mut index: HashMap<ThreadKey, usize> = HashMap::new();
    let mut threads: Vec<ConversationThread> = Vec::new();

    for rec in records {
        let from_viewer = &rec.sender_id == viewer;
        let (counterpart_id, counterpart_join) = if from_viewer {
            (&rec.receiver_id, rec.receiver.as_ref())
        } else {
            (&rec.sender_id, rec.sender.as_ref())
        };
        let key = ThreadKey::new(rec.post_id, counterpart_id.clone());

        let slot = *index.entry(key.clone()).or_insert_with(|| {
            let (post_title, post_type) = match &rec.post {
                Some(p) => (p.title.clone(), p.post_type),
                None => (UNKNOWN_POST.to_string(), PostType::default()),
            };
            threads.push(ConversationThread {
                id: key.to_string(),
                counterpart: Counterpart::from_join(counterpart_id.clone(), counterpart_join),
                key,
                post_id: rec.post_id,
                post_title,
                post_type,
                messages: Vec::new(),
                created_at: rec.created_at,
                last_message_at: Some(rec.created_at),
                last_message: rec.content.clone(),
                unread_count: 0,
            });
            threads.len() - 1
        });

        let (sender_name, sender_avatar) = match &rec.sender {
            Some(p) => (p.name.clone(), p.avatar_url.clone()),
            None => (UNKNOWN_NAME.to_string(), String::new()),
        };
        threads[slot].messages.push(ChatMessage {
            id: rec.id,
            sender_id: rec.sender_id.clone(),
            sender_name,
            sender_avatar,
            text: rec.content.clone(),
            timestamp: rec.created_at,
        });
    }

    for thread in &mut threads {
        thread.messages.sort_by_key(|m| m.timestamp);
        thread.refresh_summary();
    }
    threads.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    threads
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn profile(name: &str) -> Option<ProfileJoin> {
        Some(ProfileJoin {
            name: name.to_string(),
            avatar_url: format!("https://avatars.example/{}.png", name),
            email: format!("{}@example.com", name.to_lowercase()),
        })
    }

    fn record(id: u64, post: u64, from: &str, to: &str, secs: i64) -> MessageRecord {
        MessageRecord {
            id: MessageId(id),
            sender_id: uid(from),
            receiver_id: uid(to),
            post_id: PostId(post),
            content: format!("m{}", id),
            created_at: at(secs),
            sender: profile(from),
            receiver: profile(to),
            post: Some(PostJoin {
                title: format!("post {}", post),
                post_type: PostType::Found,
            }),
        }
    }

    #[test]
    fn test_two_postings_one_counterpart() {
        let me = uid("me");
        let records = vec![record(1, 10, "me", "b", 1), record(2, 20, "b", "me", 2)];

        let threads = derive_conversations(&me, &records);
        let ids: Vec<_> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["20:b", "10:b"]);
        assert!(threads.iter().all(|t| t.messages.len() == 1));
        assert_eq!(threads[0].counterpart.name, "b");
    }

    #[test]
    fn test_interleaved_conversation_is_chronological() {
        let me = uid("me");
        let records = vec![
            record(1, 5, "me", "a", 1),
            record(2, 5, "a", "me", 3),
            record(3, 5, "me", "a", 2),
        ];

        let threads = derive_conversations(&me, &records);
        assert_eq!(threads.len(), 1);
        let t = &threads[0];
        assert_eq!(t.id, "5:a");
        let order: Vec<u64> = t.messages.iter().map(|m| m.id.0).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(t.last_message, "m2");
        assert_eq!(t.last_message_at, Some(at(3)));
        assert_eq!(t.created_at, at(1));
        assert_eq!(t.unread_count, 0);
    }

    #[test]
    fn test_equal_timestamps_keep_fetch_order() {
        let me = uid("me");
        let records = vec![
            record(7, 1, "a", "me", 5),
            record(3, 1, "me", "a", 5),
            record(9, 1, "a", "me", 5),
        ];
        let threads = derive_conversations(&me, &records);
        let order: Vec<u64> = threads[0].messages.iter().map(|m| m.id.0).collect();
        assert_eq!(order, vec![7, 3, 9]);
    }

    #[test]
    fn test_missing_joins_use_placeholders() {
        let me = uid("me");
        let mut rec = record(1, 3, "ghost", "me", 1);
        rec.sender = None;
        rec.post = None;

        let threads = derive_conversations(&me, &[rec]);
        assert_eq!(threads.len(), 1);
        let t = &threads[0];
        assert_eq!(t.counterpart.name, "Unknown");
        assert_eq!(t.counterpart.avatar, "");
        assert_eq!(t.counterpart.email, "");
        assert_eq!(t.post_title, "Unknown Post");
        assert_eq!(t.post_type, PostType::Lost);
        assert_eq!(t.messages[0].sender_name, "Unknown");
    }

    #[test]
    fn test_counterpart_comes_from_other_side() {
        let me = uid("me");
        let threads = derive_conversations(&me, &[record(1, 3, "me", "carol", 1)]);
        assert_eq!(threads[0].counterpart.id, uid("carol"));
        assert_eq!(threads[0].counterpart.email, "carol@example.com");
        assert_eq!(threads[0].messages[0].sender_name, "me");
    }

    #[test]
    fn test_empty_input_yields_no_threads() {
        assert!(derive_conversations(&uid("me"), &[]).is_empty());
    }

    #[test]
    fn test_placeholder_is_distinguishable() {
        let t = ConversationThread::placeholder(uid("b"), "Bea", PostId(4), "Keys", PostType::Lost);
        assert!(t.is_placeholder());
        assert!(t.messages.is_empty());
        assert_eq!(t.last_message, "");
        assert_eq!(t.last_message_at, None);
        assert_eq!(t.key.to_string(), "4:b");
        assert_ne!(t.id, t.key.to_string());
    }

    #[test]
    fn test_mixed_input_groups_orders_and_is_repeatable() {
        let me = uid("me");
        let records = vec![
            record(6, 2, "c", "me", 40),
            record(1, 1, "me", "a", 10),
            record(4, 2, "me", "c", 5),
            record(3, 1, "a", "me", 30),
            record(5, 1, "me", "b", 20),
            record(2, 1, "me", "a", 15),
        ];

        let threads = derive_conversations(&me, &records);
        let total: usize = threads.iter().map(|t| t.messages.len()).sum();
        assert_eq!(total, records.len());

        for t in &threads {
            assert!(t.messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        assert!(threads
            .windows(2)
            .all(|w| w[0].last_message_at >= w[1].last_message_at));

        let ids: Vec<_> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2:c", "1:a", "1:b"]);
        assert_eq!(threads[1].created_at, at(10));

        assert_eq!(derive_conversations(&me, &records), threads);
    }
}
