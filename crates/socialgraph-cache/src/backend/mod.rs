//! Backend adapters over a key-value store.
//!
//! ## Variants
//!
//! - **Local**: in-process DashMap store, optionally split into simulated shards
//! - **SingleNode**: one Redis server behind a deadpool connection pool
//! - **Sharded**: Redis Cluster, with a dedicated scan pool per master node
//!
//! Everything above this module talks to `dyn BackendAdapter` and never to a
//! concrete variant. The only topology-dependent decision (which invalidation
//! strategy is safe) is made by the invalidation engine through
//! [`BackendAdapter::topology`] and [`BackendAdapter::scan_coverage`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CacheError, CacheResult};

pub mod local;
pub mod sharded;
pub mod single;

pub use local::LocalBackend;
pub use sharded::ShardedBackend;
pub use single::SingleNodeBackend;

/// `COUNT` hint passed to every `SCAN` round-trip.
pub const SCAN_COUNT: usize = 100;

/// Layout of the key space behind an adapter. Fixed for the adapter's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendTopology {
    SingleNode { addr: String },
    Sharded { addrs: Vec<String> },
}

impl BackendTopology {
    pub fn is_sharded(&self) -> bool {
        matches!(self, Self::Sharded { .. })
    }

    /// Number of independently scannable shards.
    pub fn shard_count(&self) -> usize {
        match self {
            Self::SingleNode { .. } => 1,
            Self::Sharded { addrs } => addrs.len(),
        }
    }
}

/// Whether a full `scan_keys_matching` is known to visit every shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanCoverage {
    Full,
    Unconfirmed,
}

/// Connection pool and command counters reported by an adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub timeouts: u64,
    pub total_conns: u64,
    pub idle_conns: u64,
    pub stale_conns: u64,
}

/// Uniform operation set over every backend variant.
///
/// Implementations must be safe for unlimited concurrent use; callers never
/// lock around them. Every call is bounded by the adapter's deadline and a
/// timeout surfaces as [`CacheError::BackendUnavailable`].
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Short label used in stats and health output ("standalone", "cluster", "local").
    fn backend_type(&self) -> &'static str;

    fn topology(&self) -> &BackendTopology;

    fn scan_coverage(&self) -> ScanCoverage;

    /// Fetch raw bytes. `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store raw bytes. `ttl = None` stores without expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Atomically increment an integer counter, creating it at 1 without expiry.
    async fn incr(&self, key: &str) -> CacheResult<u64>;

    /// Enumerate keys matching a glob on one shard, following the cursor to completion.
    async fn scan_shard(&self, pattern: &str, shard: usize) -> CacheResult<Vec<String>>;

    /// Enumerate keys matching a glob on every shard.
    ///
    /// Each shard is scanned to completion before the next one starts; keys
    /// reported by more than one node are returned once.
    async fn scan_keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for shard in 0..self.topology().shard_count() {
            for key in self.scan_shard(pattern, shard).await? {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    async fn ping(&self) -> CacheResult<()>;

    fn pool_stats(&self) -> PoolStats;
}

/// Lock-free counters shared by the adapter implementations.
#[derive(Debug, Default)]
pub struct PoolCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    timeouts: AtomicU64,
    stale: AtomicU64,
}

impl PoolCounters {
    pub fn record_lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Map a Redis error, counting connections that were dropped under us.
    pub fn redis_error(&self, err: redis::RedisError) -> CacheError {
        if err.is_connection_dropped() || err.is_io_error() || err.is_connection_refusal() {
            self.stale.fetch_add(1, Ordering::Relaxed);
        }
        CacheError::from(err)
    }

    pub fn snapshot(&self, total_conns: u64, idle_conns: u64) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            total_conns,
            idle_conns,
            stale_conns: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// Pool sizing shared by the Redis adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_size: usize,
    /// Connections opened eagerly at startup and left idle in the pool.
    pub min_idle: usize,
    /// Deadline applied to every backend call, pool checkout included.
    pub command_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 2,
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolOptions {
    pub(crate) fn pool_config(&self) -> deadpool_redis::PoolConfig {
        let mut config = deadpool_redis::PoolConfig::new(self.max_size.max(1));
        config.timeouts.wait = Some(self.command_timeout);
        config.timeouts.create = Some(self.command_timeout);
        config.timeouts.recycle = Some(self.command_timeout);
        config
    }
}

/// Run a backend call under a deadline; an elapsed deadline counts as a timeout.
pub(crate) async fn with_deadline<T, F>(
    deadline: Duration,
    counters: &PoolCounters,
    op: &'static str,
    fut: F,
) -> CacheResult<T>
where
    F: Future<Output = CacheResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            counters.record_timeout();
            tracing::warn!(op, deadline_ms = deadline.as_millis() as u64, "cache backend call timed out");
            Err(CacheError::unavailable(format!(
                "{op} timed out after {}ms",
                deadline.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_count_follows_topology() {
        let single = BackendTopology::SingleNode {
            addr: "127.0.0.1:6379".into(),
        };
        let sharded = BackendTopology::Sharded {
            addrs: vec!["10.0.0.1:7000".into(), "10.0.0.2:7000".into(), "10.0.0.3:7000".into()],
        };
        assert_eq!(single.shard_count(), 1);
        assert!(!single.is_sharded());
        assert_eq!(sharded.shard_count(), 3);
        assert!(sharded.is_sharded());
    }

    #[test]
    fn counters_snapshot() {
        let counters = PoolCounters::default();
        counters.record_lookup(true);
        counters.record_lookup(false);
        counters.record_lookup(false);
        counters.record_timeout();

        let stats = counters.snapshot(4, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.total_conns, 4);
        assert_eq!(stats.idle_conns, 3);
        assert_eq!(stats.stale_conns, 0);
    }

    #[tokio::test]
    async fn deadline_maps_to_unavailable() {
        let counters = PoolCounters::default();
        let result: CacheResult<()> = with_deadline(
            Duration::from_millis(10),
            &counters,
            "GET",
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
        assert_eq!(counters.snapshot(0, 0).timeouts, 1);
    }
}
