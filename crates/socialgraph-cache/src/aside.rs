//! Cache-aside orchestration for read paths.
//!
//! A read tries the cache, falls back to the caller's compute closure on any
//! cache failure, and hands the computed value to a detached population task.
//! Writes call [`CacheAside::invalidate_scope`] (or its detached variant)
//! after the system of record has committed.
//!
//! Each scope carries an in-process generation, bumped before every
//! invalidation. A population captures the generation when its read starts
//! and never leaves behind an entry computed before a later invalidation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::BackendAdapter;
use crate::error::{CacheError, CacheResult};
use crate::invalidation::{
    InvalidationEngine, InvalidationReport, InvalidationStrategy, StrategySetting,
};
use crate::keys::{CacheKey, PageRequest, ResourceKind, Scope};
use crate::metrics::{CacheMetrics, NoopMetrics};
use crate::store::{CacheStats, CacheStore};
use crate::task::Spawner;

/// Per-resource TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub feed: Duration,
    pub user_posts: Duration,
    pub user_profile: Duration,
    pub search: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            feed: Duration::from_secs(300),
            user_posts: Duration::from_secs(600),
            user_profile: Duration::from_secs(1800),
            search: Duration::from_secs(120),
        }
    }
}

impl TtlPolicy {
    /// TTL for entries of `kind`. Version counters never expire.
    pub fn for_kind(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Feed => self.feed,
            ResourceKind::UserPosts => self.user_posts,
            ResourceKind::UserProfile => self.user_profile,
            ResourceKind::Search => self.search,
            ResourceKind::CacheVersion => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Connected,
    Disconnected,
}

/// Result of [`CacheAside::health_check`]. `stats` is `None` when disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub backend_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CacheStats>,
}

impl HealthReport {
    pub fn is_connected(&self) -> bool {
        self.status == HealthStatus::Connected
    }
}

struct Inner {
    store: CacheStore,
    engine: InvalidationEngine,
    spawner: Spawner,
    metrics: Arc<dyn CacheMetrics>,
    ttl: TtlPolicy,
    generations: DashMap<Scope, u64>,
}

impl Inner {
    fn generation(&self, scope: &Scope) -> u64 {
        self.generations.get(scope).map(|g| *g).unwrap_or(0)
    }

    fn bump_generation(&self, scope: &Scope) {
        *self.generations.entry(scope.clone()).or_insert(0) += 1;
    }
}

/// Read-through / write-behind coordinator. Cheap to clone.
#[derive(Clone)]
pub struct CacheAside {
    inner: Arc<Inner>,
}

impl CacheAside {
    pub fn builder(backend: Arc<dyn BackendAdapter>) -> CacheAsideBuilder {
        CacheAsideBuilder::new(backend)
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    pub fn strategy(&self) -> InvalidationStrategy {
        self.inner.engine.strategy()
    }

    pub fn ttl(&self) -> &TtlPolicy {
        &self.inner.ttl
    }

    /// Return the cached value for `scope`/`page`, or compute it.
    ///
    /// Cache failures of any kind fall through to `compute`; only `compute`'s
    /// own error is returned. On a miss the computed value is written by a
    /// detached task and the caller does not wait for it.
    pub async fn get_or_populate<T, E, F, Fut>(
        &self,
        scope: &Scope,
        page: Option<PageRequest>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let kind = scope.kind();
        let generation = self.inner.generation(scope);

        let key = match self.inner.engine.resolve_key(scope, page).await {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "Failed to resolve cache key; bypassing cache");
                None
            }
        };

        let mut corrupt = false;
        if let Some(key) = &key {
            match self.inner.store.get::<T>(key).await {
                Ok(value) => {
                    tracing::debug!(key = %key, "cache hit");
                    self.inner.metrics.record_hit(kind);
                    return Ok(value);
                }
                Err(CacheError::Miss { .. }) => {
                    tracing::debug!(key = %key, "cache miss");
                }
                Err(e @ CacheError::Decode { .. }) => {
                    tracing::warn!(key = %key, error = %e, "Undecodable cache entry; recomputing");
                    corrupt = true;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache read failed; serving from system of record");
                }
            }
        }
        self.inner.metrics.record_miss(kind);

        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                if let (true, Some(key)) = (corrupt, key) {
                    self.evict(key).await;
                }
                return Err(e);
            }
        };

        if let Some(key) = key {
            self.populate(scope, key, &value, generation, corrupt).await;
        }
        Ok(value)
    }

    /// Write `value` in a detached task unless `scope` was invalidated meanwhile.
    ///
    /// `replaces_corrupt` means an undecodable entry sits at `key`; whenever the
    /// fresh value cannot be written over it, the entry is deleted instead.
    async fn populate<T: Serialize>(
        &self,
        scope: &Scope,
        key: CacheKey,
        value: &T,
        generation: u64,
        replaces_corrupt: bool,
    ) {
        let kind = scope.kind();
        let data = match CacheStore::encode(&key, value) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cannot cache value");
                self.inner.metrics.record_population_failure(kind);
                if replaces_corrupt {
                    self.evict(key).await;
                }
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        let scope = scope.clone();
        let ttl = self.inner.ttl.for_kind(kind);
        self.inner
            .spawner
            .run("cache_populate", async move {
                if inner.generation(&scope) != generation {
                    tracing::debug!(key = %key, "scope invalidated during read; skipping population");
                    if replaces_corrupt {
                        remove_entry(&inner, &key).await;
                    }
                    return;
                }
                if let Err(e) = inner.store.set_encoded(&key, data, ttl).await {
                    tracing::warn!(key = %key, error = %e, "Failed to populate cache");
                    inner.metrics.record_population_failure(kind);
                    if replaces_corrupt {
                        remove_entry(&inner, &key).await;
                    }
                    return;
                }
                if inner.generation(&scope) != generation {
                    tracing::debug!(key = %key, "scope invalidated during population; removing entry");
                    remove_entry(&inner, &key).await;
                }
            })
            .await;
    }

    async fn evict(&self, key: CacheKey) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .spawner
            .run("cache_evict", async move {
                remove_entry(&inner, &key).await;
            })
            .await;
    }

    /// Invalidate every entry of `scope` and wait for the outcome.
    pub async fn invalidate_scope(&self, scope: &Scope) -> CacheResult<InvalidationReport> {
        self.inner.bump_generation(scope);
        self.inner.engine.invalidate_scope(scope).await
    }

    /// Invalidate `scope` in a detached task. Failures are logged only.
    pub async fn invalidate_scope_detached(&self, scope: Scope) {
        self.inner.bump_generation(&scope);
        let inner = Arc::clone(&self.inner);
        self.inner
            .spawner
            .run("cache_invalidate", async move {
                match inner.engine.invalidate_scope(&scope).await {
                    Ok(report) if !report.is_complete() => {
                        tracing::warn!(
                            scope = %scope,
                            failed_batches = report.failed_batches,
                            "Scope partially invalidated"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(scope = %scope, error = %e, "Failed to invalidate cache scope");
                    }
                }
            })
            .await;
    }

    /// Ping the backend; stats are reported only while it is reachable.
    pub async fn health_check(&self) -> HealthReport {
        let backend_type = self.inner.store.backend().backend_type().to_string();
        match self.inner.store.health_check().await {
            Ok(()) => HealthReport {
                status: HealthStatus::Connected,
                backend_type,
                stats: Some(self.inner.store.stats()),
            },
            Err(e) => {
                tracing::warn!(backend = %backend_type, error = %e, "Cache health check failed");
                HealthReport {
                    status: HealthStatus::Disconnected,
                    backend_type,
                    stats: None,
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.store.stats()
    }
}

async fn remove_entry(inner: &Inner, key: &CacheKey) {
    if let Err(e) = inner.store.delete(key).await {
        tracing::warn!(key = %key, error = %e, "Failed to remove cache entry");
    }
}

pub struct CacheAsideBuilder {
    backend: Arc<dyn BackendAdapter>,
    strategy: StrategySetting,
    metrics: Arc<dyn CacheMetrics>,
    spawner: Spawner,
    ttl: TtlPolicy,
}

impl CacheAsideBuilder {
    fn new(backend: Arc<dyn BackendAdapter>) -> Self {
        Self {
            backend,
            strategy: StrategySetting::default(),
            metrics: Arc::new(NoopMetrics),
            spawner: Spawner::default(),
            ttl: TtlPolicy::default(),
        }
    }

    pub fn strategy(mut self, strategy: StrategySetting) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> CacheAside {
        let engine = InvalidationEngine::new(
            Arc::clone(&self.backend),
            self.strategy,
            Arc::clone(&self.metrics),
        );
        CacheAside {
            inner: Arc::new(Inner {
                store: CacheStore::new(self.backend),
                engine,
                spawner: self.spawner,
                metrics: self.metrics,
                ttl: self.ttl,
                generations: DashMap::new(),
            }),
        }
    }
}
