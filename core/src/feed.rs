/// Posting feed state: the fetched list plus the active filter
use crate::error::Result;
use crate::ids::{PostId, UserId};
use crate::models::Post;
use crate::post_service::{PostFilter, PostService};
use tracing::error;

#[derive(Default)]
pub struct Feed {
    posts: Vec<Post>,
    filter: PostFilter,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &PostFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: PostFilter) {
        self.filter = filter;
    }

    pub fn all(&self) -> &[Post] {
        &self.posts
    }

    pub fn visible(&self) -> Vec<&Post> {
        self.filter.apply(&self.posts)
    }

    /// Re-fetch only the feed. A failed fetch leaves an empty list.
    pub async fn refresh(&mut self, service: &PostService) -> Result<()> {
        match service.list_posts().await {
            Ok(posts) => {
                self.posts = posts;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load posts: {}", e);
                self.posts.clear();
                Err(e)
            }
        }
    }

    /// Delete remotely, then drop the post from the local list
    pub async fn delete(
        &mut self,
        service: &PostService,
        viewer: &UserId,
        id: PostId,
    ) -> Result<()> {
        service.delete_post(viewer, id).await?;
        self.posts.retain(|p| p.id != id);
        Ok(())
    }

    pub fn count_by_owner(&self, user: &UserId) -> usize {
        self.posts.iter().filter(|p| p.is_owned_by(user)).count()
    }
}
