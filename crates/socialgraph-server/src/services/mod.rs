//! Domain services over the system of record, fronted by the cache-aside layer.
//!
//! Reads go through [`CacheAside::get_or_populate`]; writes commit to the
//! [`SystemOfRecord`] first and invalidate the affected scopes afterwards.
//!
//! [`CacheAside::get_or_populate`]: socialgraph_cache::CacheAside::get_or_populate

use async_trait::async_trait;
use socialgraph_cache::CacheError;
use thiserror::Error;

use crate::models::{CreatePostRequest, Post, UpdatePostRequest, UserProfile};

pub mod admin;
pub mod friends;
pub mod memory;
pub mod posts;
pub mod users;

pub use admin::{CacheAdmin, RefreshReport, ScopeFailure};
pub use friends::FriendService;
pub use memory::InMemoryRecords;
pub use posts::PostService;
pub use users::UserService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("system of record error: {0}")]
    Storage(String),

    #[error(
        "cache refresh for user {user_id} failed for {} scope(s)",
        .failures.len()
    )]
    RefreshFailed {
        user_id: i64,
        failures: Vec<ScopeFailure>,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// The authoritative store. Paged reads return the page rows plus the total row count.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    /// Posts by the users `user_id` has befriended, newest first.
    async fn fetch_feed_page(&self, user_id: i64, limit: i64, offset: i64)
    -> ServiceResult<(Vec<Post>, i64)>;

    async fn fetch_user_posts_page(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<(Vec<Post>, i64)>;

    async fn fetch_user_profile(&self, user_id: i64) -> ServiceResult<UserProfile>;

    /// Users whose names start with the given prefixes, case-insensitively.
    async fn search_users(
        &self,
        first_name: &str,
        last_name: &str,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<(Vec<UserProfile>, i64)>;

    async fn create_post(&self, user_id: i64, req: &CreatePostRequest) -> ServiceResult<Post>;

    /// Fails with `NotFound` unless `post_id` exists and belongs to `user_id`.
    async fn update_post(
        &self,
        post_id: i64,
        user_id: i64,
        req: &UpdatePostRequest,
    ) -> ServiceResult<Post>;

    async fn delete_post(&self, post_id: i64, user_id: i64) -> ServiceResult<()>;

    async fn add_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()>;

    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()>;

    /// Users whose feed includes posts by `user_id`.
    async fn fetch_follower_ids(&self, user_id: i64) -> ServiceResult<Vec<i64>>;
}
