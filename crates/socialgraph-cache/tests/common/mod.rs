//! Fault-injecting backend wrappers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use socialgraph_cache::{
    BackendAdapter, BackendTopology, CacheError, CacheResult, LocalBackend, PoolStats,
    ScanCoverage,
};
use tokio::sync::Notify;

/// Wraps a [`LocalBackend`] and injects failures, delays and disconnections.
pub struct FaultyBackend {
    inner: LocalBackend,
    connected: AtomicBool,
    failing_deletes: Mutex<HashSet<usize>>,
    delete_batches: Mutex<Vec<usize>>,
    set_gate: Option<Arc<Notify>>,
    sets_completed: AtomicUsize,
    coverage: ScanCoverage,
}

impl FaultyBackend {
    pub fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            connected: AtomicBool::new(true),
            failing_deletes: Mutex::new(HashSet::new()),
            delete_batches: Mutex::new(Vec::new()),
            set_gate: None,
            sets_completed: AtomicUsize::new(0),
            coverage: ScanCoverage::Full,
        }
    }

    /// Every `set` waits for a notification on `gate` before writing.
    pub fn with_set_gate(mut self, gate: Arc<Notify>) -> Self {
        self.set_gate = Some(gate);
        self
    }

    pub fn with_coverage(mut self, coverage: ScanCoverage) -> Self {
        self.coverage = coverage;
        self
    }

    /// Fail the delete call with the given zero-based index.
    pub fn fail_delete_call(&self, index: usize) {
        self.failing_deletes.lock().unwrap().insert(index);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Sizes of every delete call issued so far, failed ones included.
    pub fn delete_batches(&self) -> Vec<usize> {
        self.delete_batches.lock().unwrap().clone()
    }

    pub fn sets_completed(&self) -> usize {
        self.sets_completed.load(Ordering::SeqCst)
    }

    pub fn local(&self) -> &LocalBackend {
        &self.inner
    }

    fn check(&self) -> CacheResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::unavailable("connection refused"))
        }
    }
}

#[async_trait]
impl BackendAdapter for FaultyBackend {
    fn backend_type(&self) -> &'static str {
        "faulty"
    }

    fn topology(&self) -> &BackendTopology {
        self.inner.topology()
    }

    fn scan_coverage(&self) -> ScanCoverage {
        self.coverage
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if let Some(gate) = &self.set_gate {
            gate.notified().await;
        }
        self.check()?;
        self.inner.set(key, value, ttl).await?;
        self.sets_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        self.check()?;
        let index = {
            let mut batches = self.delete_batches.lock().unwrap();
            batches.push(keys.len());
            batches.len() - 1
        };
        if self.failing_deletes.lock().unwrap().contains(&index) {
            return Err(CacheError::unavailable(format!("injected failure on delete #{index}")));
        }
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn incr(&self, key: &str) -> CacheResult<u64> {
        self.check()?;
        self.inner.incr(key).await
    }

    async fn scan_shard(&self, pattern: &str, shard: usize) -> CacheResult<Vec<String>> {
        self.check()?;
        self.inner.scan_shard(pattern, shard).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()?;
        self.inner.ping().await
    }

    fn pool_stats(&self) -> PoolStats {
        self.inner.pool_stats()
    }
}

/// Store `count` feed pages for `user_id` directly in the backend.
pub async fn seed_feed_pages(backend: &dyn BackendAdapter, user_id: i64, count: usize) -> Vec<String> {
    let mut keys = Vec::with_capacity(count);
    for page in 1..=count {
        let key = format!("feed:user:{user_id}:page:{page}:size:20");
        backend
            .set(&key, b"cached".to_vec(), Some(Duration::from_secs(300)))
            .await
            .unwrap();
        keys.push(key);
    }
    keys
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
