/// The embedded backend: all stores opened from one data directory
use crate::chat_service::ChatService;
use crate::error::{LostFoundError, Result};
use crate::message_store::MessageStore;
use crate::post_service::PostService;
use crate::post_store::PostStore;
use crate::profile_store::ProfileStore;
use std::path::Path;
use tracing::info;

#[derive(Clone)]
pub struct Backend {
    pub profiles: ProfileStore,
    pub posts: PostService,
    pub chat: ChatService,
}

impl Backend {
    pub fn open(data_dir: &Path, event_capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(LostFoundError::Io)?;

        let profiles = ProfileStore::new(data_dir)?;
        let post_store = PostStore::new(data_dir)?;
        let messages = MessageStore::new(data_dir)?;
        info!(
            "Opened data directory {:?}: {} posts, {} messages",
            data_dir,
            post_store.count(),
            messages.count()
        );

        Ok(Self {
            posts: PostService::new(post_store.clone(), profiles.clone()),
            chat: ChatService::new(messages, profiles.clone(), post_store, event_capacity),
            profiles,
        })
    }
}
