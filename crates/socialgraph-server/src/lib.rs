pub mod config;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod server;
pub mod services;

use std::sync::Arc;

use socialgraph_cache::{
    BackendAdapter, CacheAside, LocalBackend, ShardedBackend, SingleNodeBackend,
};

pub use config::{AppConfig, CacheConfig, RedisConfig, ServerConfig};
pub use handlers::ApiError;
pub use observability::init_tracing;
pub use server::{AppState, ServerBuilder, SocialgraphServer, build_router};
pub use services::{ServiceError, SystemOfRecord};

/// How the process ended up caching, as decided at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Redis is disabled in configuration; the in-process cache is intended.
    Disabled,
    /// Connected to the configured Redis deployment.
    Redis,
    /// Redis is configured but was unreachable; running on the in-process cache.
    Fallback,
}

/// Create a cache backend based on configuration.
///
/// ## Cache Modes
///
/// - **Redis disabled**: in-process cache (DashMap)
/// - **Cluster mode**: sharded backend over `cluster_nodes`
/// - **Otherwise**: single-node backend over `url`
///
/// ## Graceful Degradation
///
/// If the Redis connection fails, the server falls back to the in-process
/// cache and keeps running. The returned [`CacheMode`] records which case applied.
pub async fn create_cache_backend(config: &RedisConfig) -> (Arc<dyn BackendAdapter>, CacheMode) {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return (Arc::new(LocalBackend::new()), CacheMode::Disabled);
    }

    let options = config.pool_options();
    let connected: Result<Arc<dyn BackendAdapter>, _> = if config.cluster_mode {
        let urls = config.cluster_urls();
        tracing::info!(seeds = urls.len(), "Connecting to Redis Cluster");
        ShardedBackend::connect(&urls, &options)
            .await
            .map(|b| Arc::new(b) as Arc<dyn BackendAdapter>)
    } else {
        tracing::info!("Connecting to Redis");
        SingleNodeBackend::connect(&config.node_url(), &options)
            .await
            .map(|b| Arc::new(b) as Arc<dyn BackendAdapter>)
    };

    match connected {
        Ok(backend) => {
            tracing::info!(
                backend = backend.backend_type(),
                topology = ?backend.topology(),
                "Connected to Redis"
            );
            (backend, CacheMode::Redis)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            (Arc::new(LocalBackend::new()), CacheMode::Fallback)
        }
    }
}

/// Assemble the cache-aside layer over a backend with Prometheus metrics.
pub fn build_cache(config: &AppConfig, backend: Arc<dyn BackendAdapter>) -> CacheAside {
    CacheAside::builder(backend)
        .strategy(config.cache.invalidation_strategy)
        .ttl(config.cache.ttl_policy())
        .metrics(Arc::new(metrics::PrometheusCacheMetrics))
        .build()
}

pub async fn build_state(config: &AppConfig, records: Arc<dyn SystemOfRecord>) -> AppState {
    let (backend, mode) = create_cache_backend(&config.redis).await;
    AppState::new(build_cache(config, backend), records, mode)
}
