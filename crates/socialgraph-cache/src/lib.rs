//! Cache coordination layer for the social-graph API.
//!
//! ## Components
//!
//! - [`backend`]: the [`BackendAdapter`] capability set with local, single-node
//!   and sharded (Redis Cluster) variants
//! - [`store`]: typed MessagePack get/set over an adapter
//! - [`keys`]: deterministic key construction per resource kind and scope
//! - [`invalidation`]: pattern-delete and version-bump scope invalidation
//! - [`aside`]: the cache-aside read path with detached population
//!
//! ## Example
//!
//! ```ignore
//! let cache = CacheAside::builder(Arc::new(LocalBackend::new()))
//!     .strategy(StrategySetting::Auto)
//!     .build();
//!
//! let feed = cache
//!     .get_or_populate(&Scope::feed(user_id), Some(page), || db.fetch_feed(user_id, page))
//!     .await?;
//!
//! // after a write has committed
//! cache.invalidate_scope_detached(Scope::feed(user_id)).await;
//! ```

pub mod aside;
pub mod backend;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod metrics;
pub mod store;
pub mod task;

pub use aside::{CacheAside, CacheAsideBuilder, HealthReport, HealthStatus, TtlPolicy};
pub use backend::{
    BackendAdapter, BackendTopology, LocalBackend, PoolOptions, PoolStats, ScanCoverage,
    ShardedBackend, SingleNodeBackend,
};
pub use error::{CacheError, CacheResult, ErrorCategory};
pub use invalidation::{
    DELETE_BATCH_SIZE, InvalidationEngine, InvalidationReport, InvalidationStrategy,
    StrategySetting,
};
pub use keys::{
    CacheKey, DEFAULT_PAGE_SIZE, KeyNamespace, MAX_PAGE_SIZE, PageRequest, ResourceKind, Scope,
};
pub use metrics::{CacheMetrics, NoopMetrics};
pub use store::{CacheStats, CacheStore};
pub use task::Spawner;
