use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use socialgraph_cache::CacheAside;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::CacheMode;
use crate::config::AppConfig;
use crate::handlers;
use crate::services::{CacheAdmin, FriendService, PostService, SystemOfRecord, UserService};

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheAside,
    pub cache_mode: CacheMode,
    pub posts: PostService,
    pub users: UserService,
    pub friends: FriendService,
    pub admin: CacheAdmin,
}

impl AppState {
    pub fn new(cache: CacheAside, records: Arc<dyn SystemOfRecord>, cache_mode: CacheMode) -> Self {
        Self {
            posts: PostService::new(Arc::clone(&records), cache.clone()),
            users: UserService::new(Arc::clone(&records), cache.clone()),
            friends: FriendService::new(records, cache.clone()),
            admin: CacheAdmin::new(cache.clone()),
            cache,
            cache_mode,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health, metrics and cache administration
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/invalidate", post(handlers::invalidate_cache))
        // Users
        .route("/users/search", get(handlers::search_users))
        .route("/users/{user_id}", get(handlers::get_profile))
        .route("/users/{user_id}/feed", get(handlers::get_feed))
        .route(
            "/users/{user_id}/posts",
            get(handlers::get_user_posts).post(handlers::create_post),
        )
        .route(
            "/users/{user_id}/posts/{post_id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        .route("/users/{user_id}/friends", post(handlers::add_friend))
        .route(
            "/users/{user_id}/friends/{friend_id}",
            delete(handlers::remove_friend),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct SocialgraphServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connect the cache backend and assemble the router around `records`.
    pub async fn build(self, records: Arc<dyn SystemOfRecord>) -> SocialgraphServer {
        let state = crate::build_state(&self.config, records).await;
        SocialgraphServer {
            addr: self.addr,
            app: build_router(state),
        }
    }
}

impl SocialgraphServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
