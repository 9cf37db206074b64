/// Posting feed operations on top of the post and profile stores
use crate::error::{LostFoundError, Result};
use crate::ids::{PostId, UserId};
use crate::models::{Category, NewPost, Post, PostType, Profile};
use crate::post_store::PostStore;
use crate::profile_store::ProfileStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Feed filter; every populated field must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostFilter {
    /// Case-insensitive substring of the title or description
    pub query: Option<String>,
    pub category: Option<Category>,
    pub post_type: Option<PostType>,
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        let matches_query = match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => {
                let q = q.to_lowercase();
                post.title.to_lowercase().contains(&q)
                    || post.description.to_lowercase().contains(&q)
            }
        };
        let matches_category = self.category.map_or(true, |c| c == post.category);
        let matches_type = self.post_type.map_or(true, |t| t == post.post_type);

        matches_query && matches_category && matches_type
    }

    pub fn apply<'a>(&self, posts: &'a [Post]) -> Vec<&'a Post> {
        posts.iter().filter(|p| self.matches(p)).collect()
    }
}

#[derive(Clone)]
pub struct PostService {
    posts: PostStore,
    profiles: ProfileStore,
}

impl PostService {
    pub fn new(posts: PostStore, profiles: ProfileStore) -> Self {
        Self { posts, profiles }
    }

    /// Every posting, newest first, with the owner's display name joined in
    pub async fn list_posts(&self) -> Result<Vec<Post>> {
        let mut posts = self.posts.list()?;
        let mut names: HashMap<UserId, Option<String>> = HashMap::new();
        for post in &mut posts {
            let name = names
                .entry(post.user_id.clone())
                .or_insert_with(|| match self.profiles.get(&post.user_id) {
                    Ok(p) => p.map(|p| p.name),
                    Err(e) => {
                        warn!("Owner join failed for post {}: {}", post.id, e);
                        None
                    }
                })
                .clone();
            post.created_by_name = name;
        }
        Ok(posts)
    }

    pub async fn create_post(&self, owner: &Profile, new: NewPost) -> Result<Post> {
        if new.title.trim().is_empty() {
            return Err(LostFoundError::InvalidArgument(
                "post title must not be empty".to_string(),
            ));
        }
        // Messages and listings join on the profile, so it must exist first
        let owner = self.profiles.ensure(owner)?;

        let mut post = self.posts.insert(&owner.id, new)?;
        post.created_by_name = Some(owner.name);
        info!("Created {} post {} ({})", post.post_type, post.id, post.title);
        Ok(post)
    }

    /// Owner-only delete
    pub async fn delete_post(&self, viewer: &UserId, id: PostId) -> Result<()> {
        let post = self
            .posts
            .get(id)?
            .ok_or_else(|| LostFoundError::NotFound(format!("post {}", id)))?;
        if !post.is_owned_by(viewer) {
            return Err(LostFoundError::Unauthorized(format!(
                "post {} belongs to another user",
                id
            )));
        }
        self.posts.delete(id)?;
        info!("Deleted post {}", id);
        Ok(())
    }

    pub async fn count_by_owner(&self, user: &UserId) -> Result<usize> {
        Ok(self
            .posts
            .list()?
            .iter()
            .filter(|p| p.is_owned_by(user))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use chrono::Utc;

    fn post(title: &str, description: &str, category: Category, post_type: PostType) -> Post {
        Post {
            id: PostId(1),
            title: title.to_string(),
            description: description.to_string(),
            post_type,
            category,
            image_url: None,
            location: Location {
                lat: 0.0,
                lng: 0.0,
                name: String::new(),
            },
            contact_info: None,
            user_id: UserId::new("owner").unwrap(),
            created_by_name: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_query_matches_title_or_description() {
        let wallet = post(
            "Brown Wallet",
            "near the bus stop",
            Category::BagsWallets,
            PostType::Lost,
        );
        let by_title = PostFilter {
            query: Some("WALLET".to_string()),
            ..Default::default()
        };
        let by_description = PostFilter {
            query: Some("bus".to_string()),
            ..Default::default()
        };
        let miss = PostFilter {
            query: Some("phone".to_string()),
            ..Default::default()
        };
        assert!(by_title.matches(&wallet));
        assert!(by_description.matches(&wallet));
        assert!(!miss.matches(&wallet));
        assert!(PostFilter::default().matches(&wallet));
    }

    #[test]
    fn test_filter_combines_category_and_type() {
        let cat = post("Grey cat", "", Category::Pets, PostType::Found);
        let found_pets = PostFilter {
            category: Some(Category::Pets),
            post_type: Some(PostType::Found),
            ..Default::default()
        };
        let lost_pets = PostFilter {
            category: Some(Category::Pets),
            post_type: Some(PostType::Lost),
            ..Default::default()
        };
        assert!(found_pets.matches(&cat));
        assert!(!lost_pets.matches(&cat));
        let posts = vec![cat];
        assert_eq!(found_pets.apply(&posts).len(), 1);
    }
}
