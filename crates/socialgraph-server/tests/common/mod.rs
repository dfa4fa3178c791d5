#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socialgraph_cache::{
    BackendAdapter, BackendTopology, CacheAside, CacheError, CacheResult, LocalBackend, PoolStats,
    ScanCoverage, Spawner, StrategySetting,
};
use socialgraph_server::{AppState, CacheMode};
use socialgraph_server::services::InMemoryRecords;

/// Backend whose every call fails as if the server were unreachable.
pub struct DownBackend {
    topology: BackendTopology,
}

impl Default for DownBackend {
    fn default() -> Self {
        Self {
            topology: BackendTopology::SingleNode {
                addr: "10.255.255.1:6379".into(),
            },
        }
    }
}

#[async_trait]
impl BackendAdapter for DownBackend {
    fn backend_type(&self) -> &'static str {
        "standalone"
    }

    fn topology(&self) -> &BackendTopology {
        &self.topology
    }

    fn scan_coverage(&self) -> ScanCoverage {
        ScanCoverage::Full
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn delete(&self, _keys: &[String]) -> CacheResult<u64> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn incr(&self, _key: &str) -> CacheResult<u64> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn scan_shard(&self, _pattern: &str, _shard: usize) -> CacheResult<Vec<String>> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::unavailable("connection refused"))
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats::default()
    }
}

/// Cache-aside layer that runs detached work inline.
pub fn inline_cache(backend: Arc<dyn BackendAdapter>, strategy: StrategySetting) -> CacheAside {
    CacheAside::builder(backend)
        .strategy(strategy)
        .spawner(Spawner::Inline)
        .build()
}

pub struct Fixture {
    pub records: Arc<InMemoryRecords>,
    pub backend: LocalBackend,
    pub state: AppState,
}

impl Fixture {
    pub fn new(strategy: StrategySetting) -> Self {
        let records = Arc::new(InMemoryRecords::new());
        let backend = LocalBackend::new();
        let cache = inline_cache(Arc::new(backend.clone()), strategy);
        let state = AppState::new(cache, records.clone(), CacheMode::Disabled);
        Self {
            records,
            backend,
            state,
        }
    }

    /// State over a Redis backend that went away after startup.
    pub fn down() -> Self {
        let records = Arc::new(InMemoryRecords::new());
        let cache = inline_cache(Arc::new(DownBackend::default()), StrategySetting::Auto);
        let state = AppState::new(cache, records.clone(), CacheMode::Redis);
        Self {
            records,
            backend: LocalBackend::new(),
            state,
        }
    }
}
