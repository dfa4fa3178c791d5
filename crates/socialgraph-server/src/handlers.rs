use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use socialgraph_cache::{CacheStats, DEFAULT_PAGE_SIZE, HealthStatus, PageRequest};
use thiserror::Error;

use crate::CacheMode;
use crate::metrics;
use crate::models::{
    CreatePostRequest, FeedResponse, FriendRequest, PageQuery, Post, SearchQuery, SearchResponse,
    UpdatePostRequest, UserProfile,
};
use crate::server::AppState;
use crate::services::{RefreshReport, ServiceError};

/// HTTP-facing error with a JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("cache refresh failed for user {user_id}")]
    CacheRefresh {
        user_id: i64,
        failures: Vec<FailureBody>,
    },
}

#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub scope: String,
    pub category: String,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) | Self::CacheRefresh { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            ServiceError::Validation(msg) => Self::BadRequest(msg),
            ServiceError::RefreshFailed { user_id, failures } => Self::CacheRefresh {
                user_id,
                failures: failures
                    .into_iter()
                    .map(|f| FailureBody {
                        scope: f.scope.to_string(),
                        category: f.error.category().to_string(),
                        message: f.error.to_string(),
                    })
                    .collect(),
            },
            other => {
                tracing::error!(error = %other, "request failed");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::CacheRefresh { user_id, failures } => json!({
                "error": self.to_string(),
                "user_id": user_id,
                "failures": failures,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn page_of(page: Option<i64>, size: Option<i64>) -> PageRequest {
    PageRequest::clamped(page.unwrap_or(1), size.unwrap_or(DEFAULT_PAGE_SIZE as i64))
}

// ---------------------------------------------------------------------------
// Health, stats and metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub cache: CacheHealthBody,
}

#[derive(Debug, Serialize)]
pub struct CacheHealthBody {
    pub status: &'static str,
    pub backend_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CacheStats>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let without_stats = |status: &'static str| CacheHealthBody {
        status,
        backend_type: state.cache.stats().backend_type,
        stats: None,
    };
    match state.cache_mode {
        CacheMode::Disabled => {
            return Json(HealthBody {
                status: "ok",
                cache: without_stats("not_configured"),
            });
        }
        CacheMode::Fallback => {
            return Json(HealthBody {
                status: "degraded",
                cache: without_stats("disconnected"),
            });
        }
        CacheMode::Redis => {}
    }

    let report = state.cache.health_check().await;
    let (status, cache_status) = match report.status {
        HealthStatus::Connected => ("ok", "connected"),
        HealthStatus::Disconnected => ("degraded", "disconnected"),
    };
    Json(HealthBody {
        status,
        cache: CacheHealthBody {
            status: cache_status,
            backend_type: report.backend_type,
            stats: report.stats,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    pub status: &'static str,
    pub strategy: &'static str,
    #[serde(flatten)]
    pub stats: CacheStats,
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<StatsBody> {
    let stats = state.cache.stats();
    metrics::record_pool_stats(&stats);
    Json(StatsBody {
        status: "active",
        strategy: state.cache.strategy().as_str(),
        stats,
    })
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub user_id: Option<i64>,
}

pub async fn invalidate_cache(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = query
        .user_id
        .ok_or_else(|| ApiError::BadRequest("user_id is required".into()))?;
    let RefreshReport { scopes, .. } = state.admin.force_refresh(user_id).await?;
    Ok(Json(json!({
        "message": "Cache invalidated successfully",
        "user_id": user_id,
        "scopes": scopes,
    })))
}

pub async fn metrics_endpoint() -> Response {
    match metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Users, posts and friendships
// ---------------------------------------------------------------------------

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.profile(user_id).await?))
}

pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let page = page_of(query.page, query.size);
    Ok(Json(
        state
            .users
            .search(&query.first_name, &query.last_name, page)
            .await?,
    ))
}

pub async fn get_feed(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<FeedResponse>> {
    let page = page_of(query.page, query.size);
    Ok(Json(state.posts.feed(user_id, page).await?))
}

pub async fn get_user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<FeedResponse>> {
    let page = page_of(query.page, query.size);
    Ok(Json(state.posts.user_posts(user_id, page).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = state.posts.create_post(user_id, &req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path((user_id, post_id)): Path<(i64, i64)>,
    Json(req): Json<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.posts.update_post(post_id, user_id, &req).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path((user_id, post_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    state.posts.delete_post(post_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_friend(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<FriendRequest>,
) -> ApiResult<StatusCode> {
    state.friends.add_friend(user_id, req.friend_id).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path((user_id, friend_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    state.friends.remove_friend(user_id, friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
