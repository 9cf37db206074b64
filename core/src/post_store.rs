/// Posting storage: one sled tree keyed by big-endian post id
use crate::error::{LostFoundError, Result};
use crate::ids::{PostId, UserId};
use crate::models::{NewPost, Post};
use chrono::Utc;
use std::path::Path;
use tracing::debug;

pub struct PostStore {
    db: sled::Db,
}

impl PostStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("posts.db"))
            .map_err(|e| LostFoundError::Storage(format!("Failed to open posts DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Persist a new posting and return it with its assigned id and time
    pub fn insert(&self, owner: &UserId, new: NewPost) -> Result<Post> {
        // sled ids start at 0; keep 0 free so ids look like database serials
        let id = PostId(self.db.generate_id()? + 1);
        let post = Post {
            id,
            title: new.title,
            description: new.description,
            post_type: new.post_type,
            category: new.category,
            image_url: new.image_url,
            location: new.location,
            contact_info: new.contact_info,
            user_id: owner.clone(),
            created_by_name: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_vec(&post).map_err(LostFoundError::Serialization)?;
        self.db
            .insert(id.to_key(), value)
            .map_err(|e| LostFoundError::Storage(format!("Failed to save post: {}", e)))?;
        debug!("Stored post {} for {}", id, owner);
        Ok(post)
    }

    pub fn get(&self, id: PostId) -> Result<Option<Post>> {
        match self.db.get(id.to_key())? {
            Some(val) => Ok(Some(
                serde_json::from_slice(&val).map_err(LostFoundError::Serialization)?,
            )),
            None => Ok(None),
        }
    }

    /// All postings, newest first
    pub fn list(&self) -> Result<Vec<Post>> {
        let mut posts = Vec::new();
        for entry in self.db.iter() {
            let (_, value) = entry?;
            match serde_json::from_slice::<Post>(&value) {
                Ok(p) => posts.push(p),
                Err(e) => debug!("Skipping unreadable post row: {}", e),
            }
        }
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    pub fn delete(&self, id: PostId) -> Result<bool> {
        let removed = self
            .db
            .remove(id.to_key())
            .map_err(|e| LostFoundError::Storage(format!("Failed to delete post: {}", e)))?;
        Ok(removed.is_some())
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }
}

impl Clone for PostStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}
