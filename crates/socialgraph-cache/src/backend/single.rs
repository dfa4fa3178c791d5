//! Single-node Redis backend over a deadpool connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;

use super::{
    BackendAdapter, BackendTopology, PoolCounters, PoolOptions, PoolStats, SCAN_COUNT,
    ScanCoverage, with_deadline,
};
use crate::error::{CacheError, CacheResult};

pub struct SingleNodeBackend {
    pool: Pool,
    topology: BackendTopology,
    timeout: Duration,
    counters: PoolCounters,
}

impl SingleNodeBackend {
    /// Create the pool, verify connectivity with a PING and pre-open idle connections.
    pub async fn connect(url: &str, options: &PoolOptions) -> CacheResult<Self> {
        let mut redis_config = deadpool_redis::Config::from_url(url);
        redis_config.pool = Some(options.pool_config());

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::configuration(format!("failed to create Redis pool: {e}")))?;

        let backend = Self {
            pool,
            topology: BackendTopology::SingleNode {
                addr: redact_url(url),
            },
            timeout: options.command_timeout,
            counters: PoolCounters::default(),
        };

        backend.ping().await?;
        warm_up(&backend.pool, options.min_idle).await;
        Ok(backend)
    }

    async fn connection(&self) -> CacheResult<deadpool_redis::Connection> {
        self.pool.get().await.map_err(CacheError::unavailable)
    }
}

/// Open `count` connections concurrently and hand them back to the pool idle.
pub(crate) async fn warm_up(pool: &Pool, count: usize) {
    let count = count.min(pool.status().max_size);
    let checkouts = (0..count).map(|_| pool.get());
    let opened = futures_util::future::join_all(checkouts)
        .await
        .into_iter()
        .filter(Result::is_ok)
        .count();
    tracing::debug!(requested = count, opened, "Redis pool warmed up");
}

/// Strip credentials from a connection URL for logs and topology reports.
pub(crate) fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => format!("{host}:6379"),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl BackendAdapter for SingleNodeBackend {
    fn backend_type(&self) -> &'static str {
        "standalone"
    }

    fn topology(&self) -> &BackendTopology {
        &self.topology
    }

    fn scan_coverage(&self) -> ScanCoverage {
        ScanCoverage::Full
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        with_deadline(self.timeout, &self.counters, "GET", async {
            let mut conn = self.connection().await?;
            let value: Option<Vec<u8>> = conn
                .get(key)
                .await
                .map_err(|e| self.counters.redis_error(e))?;
            self.counters.record_lookup(value.is_some());
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        with_deadline(self.timeout, &self.counters, "SET", async {
            let mut conn = self.connection().await?;
            let result: redis::RedisResult<()> = match ttl {
                Some(ttl) => {
                    conn.pset_ex(key, value, (ttl.as_millis() as u64).max(1))
                        .await
                }
                None => conn.set(key, value).await,
            };
            result.map_err(|e| self.counters.redis_error(e))
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        with_deadline(self.timeout, &self.counters, "DEL", async {
            let mut conn = self.connection().await?;
            conn.del(keys)
                .await
                .map_err(|e| self.counters.redis_error(e))
        })
        .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        with_deadline(self.timeout, &self.counters, "EXISTS", async {
            let mut conn = self.connection().await?;
            conn.exists(key)
                .await
                .map_err(|e| self.counters.redis_error(e))
        })
        .await
    }

    async fn incr(&self, key: &str) -> CacheResult<u64> {
        with_deadline(self.timeout, &self.counters, "INCR", async {
            let mut conn = self.connection().await?;
            conn.incr(key, 1u64)
                .await
                .map_err(|e| self.counters.redis_error(e))
        })
        .await
    }

    async fn scan_shard(&self, pattern: &str, shard: usize) -> CacheResult<Vec<String>> {
        if shard != 0 {
            return Err(CacheError::configuration(format!(
                "shard {shard} out of range for a single-node backend"
            )));
        }
        let mut conn =
            with_deadline(self.timeout, &self.counters, "SCAN", self.connection()).await?;
        scan_to_completion(&mut conn, pattern, self.timeout, &self.counters).await
    }

    async fn ping(&self) -> CacheResult<()> {
        with_deadline(self.timeout, &self.counters, "PING", async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| self.counters.redis_error(e))?;
            Ok(())
        })
        .await
    }

    fn pool_stats(&self) -> PoolStats {
        let status = self.pool.status();
        self.counters
            .snapshot(status.size as u64, status.available as u64)
    }
}

/// Follow a `SCAN MATCH` cursor until the server reports 0.
///
/// `deadline` bounds each round-trip, not the whole walk.
pub(crate) async fn scan_to_completion<C>(
    conn: &mut C,
    pattern: &str,
    deadline: Duration,
    counters: &PoolCounters,
) -> CacheResult<Vec<String>>
where
    C: redis::aio::ConnectionLike + Send,
{
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = with_deadline(deadline, counters, "SCAN", async {
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await
                .map_err(|e| counters.redis_error(e))
        })
        .await?;
        keys.extend(batch);
        if next == 0 {
            return Ok(keys);
        }
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use redis::{Cmd, Pipeline, RedisFuture, Value};

    /// Answers every SCAN with one key after a fixed delay.
    struct SlowCursor {
        rounds: u64,
        served: u64,
        delay: Duration,
    }

    impl redis::aio::ConnectionLike for SlowCursor {
        fn req_packed_command<'a>(&'a mut self, _cmd: &'a Cmd) -> RedisFuture<'a, Value> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.served += 1;
                let next = if self.served == self.rounds { 0 } else { self.served };
                Ok(Value::Array(vec![
                    Value::BulkString(next.to_string().into_bytes()),
                    Value::Array(vec![Value::BulkString(
                        format!("feed:{}", self.served).into_bytes(),
                    )]),
                ]))
            })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            _cmd: &'a Pipeline,
            _offset: usize,
            _count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn get_db(&self) -> i64 {
            0
        }
    }

    #[tokio::test]
    async fn long_scans_are_bounded_per_round_trip() {
        let mut conn = SlowCursor {
            rounds: 4,
            served: 0,
            delay: Duration::from_millis(30),
        };
        let counters = PoolCounters::default();
        let keys = scan_to_completion(&mut conn, "feed:*", Duration::from_millis(80), &counters)
            .await
            .unwrap();
        assert_eq!(keys, vec!["feed:1", "feed:2", "feed:3", "feed:4"]);
        assert_eq!(counters.snapshot(0, 0).timeouts, 0);
    }

    #[tokio::test]
    async fn a_stalled_round_trip_times_out() {
        let mut conn = SlowCursor {
            rounds: 2,
            served: 0,
            delay: Duration::from_millis(200),
        };
        let counters = PoolCounters::default();
        let err = scan_to_completion(&mut conn, "feed:*", Duration::from_millis(20), &counters)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::BackendUnavailable(_)), "{err:?}");
        assert_eq!(counters.snapshot(0, 0).timeouts, 1);
    }

    #[test]
    fn redact_url_drops_credentials() {
        assert_eq!(redact_url("redis://:secret@cache.internal:6380/0"), "cache.internal:6380");
        assert_eq!(redact_url("redis://localhost"), "localhost:6379");
        assert_eq!(redact_url("not a url"), "not a url");
    }
}
