//! In-memory system of record.
//!
//! Used by the development server and the test suite. Concurrent access goes
//! through DashMap; no operation holds a lock across an await point.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use super::{ServiceError, ServiceResult, SystemOfRecord};
use crate::models::{CreatePostRequest, Gender, Post, UpdatePostRequest, UserProfile};

#[derive(Default)]
pub struct InMemoryRecords {
    users: DashMap<i64, UserProfile>,
    posts: DashMap<i64, Post>,
    /// user id -> ids of the users they befriended
    friends: DashMap<i64, BTreeSet<i64>>,
    next_user_id: AtomicI64,
    next_post_id: AtomicI64,
    reads: AtomicUsize,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and return the stored profile.
    pub fn add_user(&self, username: &str, first_name: &str, last_name: &str) -> UserProfile {
        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        let profile = UserProfile {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            birth_date: "1990-01-01".to_string(),
            gender: Gender::Unknown,
            interests: String::new(),
            city: String::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.users.insert(id, profile.clone());
        profile
    }

    /// Number of read queries served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn ensure_user(&self, user_id: i64) -> ServiceResult<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(ServiceError::not_found(format!("user {user_id}")))
        }
    }

    fn page_of_posts(&self, authors: &BTreeSet<i64>, limit: i64, offset: i64) -> (Vec<Post>, i64) {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| authors.contains(&p.user_id))
            .map(|p| p.value().clone())
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = posts.len() as i64;
        let page = posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        (page, total)
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.to_lowercase().starts_with(&prefix.to_lowercase())
}

#[async_trait]
impl SystemOfRecord for InMemoryRecords {
    async fn fetch_feed_page(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<(Vec<Post>, i64)> {
        self.count_read();
        let authors = self
            .friends
            .get(&user_id)
            .map(|f| f.value().clone())
            .unwrap_or_default();
        Ok(self.page_of_posts(&authors, limit, offset))
    }

    async fn fetch_user_posts_page(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<(Vec<Post>, i64)> {
        self.count_read();
        Ok(self.page_of_posts(&BTreeSet::from([user_id]), limit, offset))
    }

    async fn fetch_user_profile(&self, user_id: i64) -> ServiceResult<UserProfile> {
        self.count_read();
        self.users
            .get(&user_id)
            .map(|u| u.value().clone())
            .ok_or_else(|| ServiceError::not_found(format!("user {user_id}")))
    }

    async fn search_users(
        &self,
        first_name: &str,
        last_name: &str,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<(Vec<UserProfile>, i64)> {
        self.count_read();
        let mut users: Vec<UserProfile> = self
            .users
            .iter()
            .filter(|u| {
                starts_with_ignore_case(&u.first_name, first_name)
                    && starts_with_ignore_case(&u.last_name, last_name)
            })
            .map(|u| u.value().clone())
            .collect();
        users.sort_by_key(|u| u.id);
        let total = users.len() as i64;
        let page = users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn create_post(&self, user_id: i64, req: &CreatePostRequest) -> ServiceResult<Post> {
        self.ensure_user(user_id)?;
        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: self.next_post_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            title: req.title.clone(),
            content: req.content.clone(),
            created_at: now,
            updated_at: now,
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(
        &self,
        post_id: i64,
        user_id: i64,
        req: &UpdatePostRequest,
    ) -> ServiceResult<Post> {
        let mut post = self
            .posts
            .get_mut(&post_id)
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| ServiceError::not_found(format!("post {post_id}")))?;
        if let Some(title) = &req.title {
            post.title = title.clone();
        }
        if let Some(content) = &req.content {
            post.content = content.clone();
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.value().clone())
    }

    async fn delete_post(&self, post_id: i64, user_id: i64) -> ServiceResult<()> {
        self.posts
            .remove_if(&post_id, |_, p| p.user_id == user_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found(format!("post {post_id}")))
    }

    async fn add_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()> {
        self.ensure_user(user_id)?;
        self.ensure_user(friend_id)?;
        if self.friends.entry(user_id).or_default().insert(friend_id) {
            Ok(())
        } else {
            Err(ServiceError::validation(format!(
                "user {friend_id} is already a friend of user {user_id}"
            )))
        }
    }

    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()> {
        let removed = self
            .friends
            .get_mut(&user_id)
            .is_some_and(|mut f| f.remove(&friend_id));
        if removed {
            Ok(())
        } else {
            Err(ServiceError::not_found(format!(
                "friendship {user_id} -> {friend_id}"
            )))
        }
    }

    async fn fetch_follower_ids(&self, user_id: i64) -> ServiceResult<Vec<i64>> {
        self.count_read();
        Ok(self
            .friends
            .iter()
            .filter(|f| f.value().contains(&user_id))
            .map(|f| *f.key())
            .collect())
    }
}
