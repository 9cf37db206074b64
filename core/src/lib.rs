/// Lost & Found - postings feed and owner messaging
///
/// Conversations are never stored: they are derived from the flat message
/// table on every read, keyed by (posting, counterpart).

pub mod backend;
pub mod chat_service;
pub mod cli_app;
pub mod config;
pub mod conversation;
pub mod error;
pub mod feed;
pub mod ids;
pub mod inbox;
pub mod message_store;
pub mod messenger_api;
pub mod messenger_types;
pub mod models;
pub mod post_service;
pub mod post_store;
pub mod profile_store;
pub mod reference_card;
pub mod session;

pub use backend::Backend;
pub use config::Config;
pub use conversation::{derive_conversations, ConversationThread, MessageRecord, ThreadKey};
pub use error::{LostFoundError, Result};
pub use ids::{MessageId, PostId, UserId};
