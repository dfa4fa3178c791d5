//! In-process backend built on DashMap.
//!
//! Used when Redis is disabled or unreachable, and by tests. With more than
//! one shard it behaves like a cluster: keys are partitioned by hash, and a
//! scan of one shard never sees keys owned by another.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;

use super::{BackendAdapter, BackendTopology, PoolCounters, PoolStats, ScanCoverage};
use crate::error::{CacheError, CacheResult};

/// A cached entry with optional TTL support.
///
/// The data is wrapped in `Arc` so cloning an entry never copies the payload.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    /// `None` stores the entry without expiry.
    pub ttl: Option<Duration>,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.cached_at.elapsed() > ttl)
    }
}

#[derive(Clone)]
pub struct LocalBackend {
    shards: Arc<Vec<DashMap<String, CachedEntry>>>,
    topology: BackendTopology,
    counters: Arc<PoolCounters>,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    /// Create a single-shard local backend.
    pub fn new() -> Self {
        Self::with_shards(1)
    }

    /// Create a local backend partitioned into `count` simulated shards.
    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        let topology = if count == 1 {
            BackendTopology::SingleNode {
                addr: "local".to_string(),
            }
        } else {
            BackendTopology::Sharded {
                addrs: (0..count).map(|i| format!("local-{i}")).collect(),
            }
        };
        Self {
            shards: Arc::new((0..count).map(|_| DashMap::new()).collect()),
            topology,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Index of the shard owning `key`.
    pub fn shard_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Number of live (unexpired) entries across all shards.
    pub fn len(&self) -> usize {
        (0..self.shards.len()).map(|i| self.shard_len(i)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live entries held by one shard.
    pub fn shard_len(&self, shard: usize) -> usize {
        self.shards
            .get(shard)
            .map(|map| map.iter().filter(|entry| !entry.is_expired()).count())
            .unwrap_or(0)
    }

    fn shard_for(&self, key: &str) -> &DashMap<String, CachedEntry> {
        &self.shards[self.shard_of(key)]
    }
}

#[async_trait]
impl BackendAdapter for LocalBackend {
    fn backend_type(&self) -> &'static str {
        "local"
    }

    fn topology(&self) -> &BackendTopology {
        &self.topology
    }

    fn scan_coverage(&self) -> ScanCoverage {
        ScanCoverage::Full
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let map = self.shard_for(key);
        map.remove_if(key, |_, entry| entry.is_expired());
        let result = map.get(key).map(|entry| entry.data.as_ref().clone());
        self.counters.record_lookup(result.is_some());
        Ok(result)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.shard_for(key)
            .insert(key.to_string(), CachedEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.shard_for(key).remove(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .shard_for(key)
            .get(key)
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn incr(&self, key: &str) -> CacheResult<u64> {
        let map = self.shard_for(key);
        map.remove_if(key, |_, entry| entry.is_expired());
        let mut entry = map
            .entry(key.to_string())
            .or_insert_with(|| CachedEntry::new(b"0".to_vec(), None));
        let current: u64 = std::str::from_utf8(&entry.data)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CacheError::decode(key, "value is not an integer"))?;
        let next = current + 1;
        // INCR keeps the existing expiry, as Redis does
        entry.data = Arc::new(next.to_string().into_bytes());
        Ok(next)
    }

    async fn scan_shard(&self, pattern: &str, shard: usize) -> CacheResult<Vec<String>> {
        let map = self.shards.get(shard).ok_or_else(|| {
            CacheError::configuration(format!(
                "shard {shard} out of range (backend has {})",
                self.shards.len()
            ))
        })?;
        let matcher = glob_to_regex(pattern)?;
        Ok(map
            .iter()
            .filter(|entry| !entry.is_expired() && matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    fn pool_stats(&self) -> PoolStats {
        self.counters.snapshot(0, 0)
    }
}

/// Translate a Redis-style glob into an anchored regex.
///
/// Supports `*`, `?` and backslash escapes; every other character is literal.
pub(crate) fn glob_to_regex(pattern: &str) -> CacheResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(next.encode_utf8(&mut [0; 4])));
                }
            }
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| CacheError::configuration(format!("invalid key pattern {pattern}: {e}")))
}
