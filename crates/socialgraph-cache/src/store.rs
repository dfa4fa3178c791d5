//! Typed cache API over a backend adapter.
//!
//! Values are stored as MessagePack; `ttl = 0` stores without expiry.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::{BackendAdapter, PoolStats};
use crate::error::{CacheError, CacheResult};
use crate::keys::CacheKey;

/// Backend type plus pool counters, as reported by health and stats endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub backend_type: String,
    pub hits: u64,
    pub misses: u64,
    pub timeouts: u64,
    pub total_conns: u64,
    pub idle_conns: u64,
    pub stale_conns: u64,
}

impl CacheStats {
    fn new(backend_type: &str, pool: PoolStats) -> Self {
        Self {
            backend_type: backend_type.to_string(),
            hits: pool.hits,
            misses: pool.misses,
            timeouts: pool.timeouts,
            total_conns: pool.total_conns,
            idle_conns: pool.idle_conns,
            stale_conns: pool.stale_conns,
        }
    }
}

#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn BackendAdapter>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn BackendAdapter>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn BackendAdapter> {
        &self.backend
    }

    /// Serialize a value the way [`CacheStore::set`] stores it.
    pub fn encode<T: Serialize + ?Sized>(key: &CacheKey, value: &T) -> CacheResult<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::serialization(key.as_str(), e))
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let data = Self::encode(key, value)?;
        self.set_encoded(key, data, ttl).await
    }

    /// Store bytes produced by [`CacheStore::encode`].
    pub async fn set_encoded(&self, key: &CacheKey, data: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        self.backend.set(key.as_str(), data, ttl).await?;
        tracing::debug!(key = %key, ttl_secs = ttl.map(|t| t.as_secs()), "cache set");
        Ok(())
    }

    /// Fetch and decode a value.
    ///
    /// Absent keys yield [`CacheError::Miss`]; undecodable bytes yield
    /// [`CacheError::Decode`]. Neither is ever turned into a default value.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheResult<T> {
        let data = self
            .backend
            .get(key.as_str())
            .await?
            .ok_or_else(|| CacheError::miss(key.as_str()))?;
        rmp_serde::from_slice(&data).map_err(|e| CacheError::decode(key.as_str(), e))
    }

    /// Remove a key. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        self.backend.delete(&[key.as_str().to_string()]).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &CacheKey) -> CacheResult<bool> {
        self.backend.exists(key.as_str()).await
    }

    /// Round-trip a PING to the backend.
    pub async fn health_check(&self) -> CacheResult<()> {
        self.backend.ping().await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.backend.backend_type(), self.backend.pool_stats())
    }
}
