use std::sync::Arc;

use socialgraph_cache::{CacheAside, PageRequest, Scope};

use super::{ServiceError, ServiceResult, SystemOfRecord};
use crate::models::{CreatePostRequest, FeedResponse, Post, UpdatePostRequest};

#[derive(Clone)]
pub struct PostService {
    records: Arc<dyn SystemOfRecord>,
    cache: CacheAside,
}

impl PostService {
    pub fn new(records: Arc<dyn SystemOfRecord>, cache: CacheAside) -> Self {
        Self { records, cache }
    }

    /// Posts of the users `user_id` has befriended, cached per page.
    pub async fn feed(&self, user_id: i64, page: PageRequest) -> ServiceResult<FeedResponse> {
        self.cache
            .get_or_populate(&Scope::feed(user_id), Some(page), || async {
                let (posts, total) = self
                    .records
                    .fetch_feed_page(user_id, page.limit(), page.offset())
                    .await?;
                Ok::<_, ServiceError>(FeedResponse::new(posts, total, page))
            })
            .await
    }

    pub async fn user_posts(&self, user_id: i64, page: PageRequest) -> ServiceResult<FeedResponse> {
        self.cache
            .get_or_populate(&Scope::user_posts(user_id), Some(page), || async {
                let (posts, total) = self
                    .records
                    .fetch_user_posts_page(user_id, page.limit(), page.offset())
                    .await?;
                Ok::<_, ServiceError>(FeedResponse::new(posts, total, page))
            })
            .await
    }

    pub async fn create_post(&self, user_id: i64, req: &CreatePostRequest) -> ServiceResult<Post> {
        if req.title.trim().is_empty() || req.content.trim().is_empty() {
            return Err(ServiceError::validation("title and content are required"));
        }
        let post = self.records.create_post(user_id, req).await?;
        tracing::debug!(post_id = post.id, user_id, "post created");
        self.invalidate_author(user_id).await;
        Ok(post)
    }

    pub async fn update_post(
        &self,
        post_id: i64,
        user_id: i64,
        req: &UpdatePostRequest,
    ) -> ServiceResult<Post> {
        if req.title.is_none() && req.content.is_none() {
            return Err(ServiceError::validation("nothing to update"));
        }
        let post = self.records.update_post(post_id, user_id, req).await?;
        self.invalidate_author(user_id).await;
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: i64, user_id: i64) -> ServiceResult<()> {
        self.records.delete_post(post_id, user_id).await?;
        self.invalidate_author(user_id).await;
        Ok(())
    }

    /// Evict every cached page that can show a post by `user_id`.
    async fn invalidate_author(&self, user_id: i64) {
        self.cache
            .invalidate_scope_detached(Scope::user_posts(user_id))
            .await;
        self.cache.invalidate_scope_detached(Scope::feed(user_id)).await;

        match self.records.fetch_follower_ids(user_id).await {
            Ok(followers) => {
                for follower in followers {
                    self.cache.invalidate_scope_detached(Scope::feed(follower)).await;
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load followers; their feeds expire with TTL");
            }
        }
    }
}
