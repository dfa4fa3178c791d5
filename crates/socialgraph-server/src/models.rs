//! Domain records and API payloads.

use serde::{Deserialize, Serialize};
use socialgraph_cache::PageRequest;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`
    pub birth_date: String,
    pub gender: Gender,
    #[serde(default)]
    pub interests: String,
    #[serde(default)]
    pub city: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One page of posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<Post>,
    pub total: i64,
    pub page: u32,
    pub pages: i64,
}

impl FeedResponse {
    pub fn new(posts: Vec<Post>, total: i64, page: PageRequest) -> Self {
        Self {
            posts,
            total,
            page: page.page(),
            pages: page.pages_for(total),
        }
    }
}

/// One page of users matching a name search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub users: Vec<UserProfile>,
    pub total: i64,
    pub page: u32,
    pub pages: i64,
}

impl SearchResponse {
    pub fn new(users: Vec<UserProfile>, total: i64, page: PageRequest) -> Self {
        Self {
            users,
            total,
            page: page.page(),
            pages: page.pages_for(total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FriendRequest {
    pub friend_id: i64,
}

/// `page`/`size` query parameters; clamped before any key is built.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub page: Option<i64>,
    pub size: Option<i64>,
}
