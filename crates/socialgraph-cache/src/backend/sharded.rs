//! Redis Cluster backend.
//!
//! Point operations go through a pooled cluster connection, which routes each
//! command to the slot owner. Key enumeration cannot go through it: a
//! cluster-wide `KEYS`/`SCAN` only ever sees the node it lands on. Instead the
//! backend discovers every master via `CLUSTER NODES` at startup and keeps a
//! dedicated pool per master, so that [`BackendAdapter::scan_keys_matching`]
//! walks each master's cursor to completion.
//!
//! When discovery fails the configured seed nodes are scanned instead and the
//! coverage is reported as [`ScanCoverage::Unconfirmed`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Runtime;
use deadpool_redis::cluster::Pool as ClusterPool;
use redis::AsyncCommands;
use redis::cluster_routing::get_slot;

use super::single::{redact_url, scan_to_completion, warm_up};
use super::{
    BackendAdapter, BackendTopology, PoolCounters, PoolOptions, PoolStats, ScanCoverage,
    with_deadline,
};
use crate::error::{CacheError, CacheResult};

struct ShardPool {
    addr: String,
    pool: deadpool_redis::Pool,
}

pub struct ShardedBackend {
    cluster: ClusterPool,
    shards: Vec<ShardPool>,
    topology: BackendTopology,
    coverage: ScanCoverage,
    timeout: Duration,
    counters: PoolCounters,
}

impl ShardedBackend {
    /// Connect to the cluster through `node_urls` (seed nodes) and build per-master scan pools.
    pub async fn connect(node_urls: &[String], options: &PoolOptions) -> CacheResult<Self> {
        if node_urls.is_empty() {
            return Err(CacheError::configuration(
                "cluster nodes are required in cluster mode",
            ));
        }

        let mut cluster_config = deadpool_redis::cluster::Config::from_urls(node_urls.to_vec());
        cluster_config.pool = Some(options.pool_config());
        let cluster = cluster_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                CacheError::configuration(format!("failed to create Redis Cluster pool: {e}"))
            })?;

        let counters = PoolCounters::default();
        let discovered = match discover_masters(&cluster, options.command_timeout, &counters).await
        {
            Ok(Some(masters)) => Some(masters),
            Ok(None) => {
                tracing::warn!("CLUSTER NODES reported masters without a usable address");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to discover cluster masters");
                None
            }
        };

        let (targets, mut coverage) = match discovered {
            Some(masters) => {
                let seed = &node_urls[0];
                let targets = masters
                    .into_iter()
                    .map(|addr| node_url(seed, &addr).map(|url| (addr, url)))
                    .collect::<CacheResult<Vec<_>>>()?;
                (targets, ScanCoverage::Full)
            }
            None => (
                node_urls
                    .iter()
                    .map(|url| (redact_url(url), url.clone()))
                    .collect(),
                ScanCoverage::Unconfirmed,
            ),
        };

        let scan_options = PoolOptions {
            max_size: options.max_size.clamp(1, 2),
            min_idle: 0,
            command_timeout: options.command_timeout,
        };
        let mut shards = Vec::with_capacity(targets.len());
        for (addr, url) in targets {
            let mut shard_config = deadpool_redis::Config::from_url(url);
            shard_config.pool = Some(scan_options.pool_config());
            let pool = shard_config
                .create_pool(Some(Runtime::Tokio1))
                .map_err(|e| {
                    CacheError::configuration(format!("failed to create scan pool for {addr}: {e}"))
                })?;
            shards.push(ShardPool { addr, pool });
        }

        let backend = Self {
            cluster,
            topology: BackendTopology::Sharded {
                addrs: shards.iter().map(|s| s.addr.clone()).collect(),
            },
            shards,
            coverage,
            timeout: options.command_timeout,
            counters,
        };

        backend.ping().await?;

        for shard in &backend.shards {
            let reachable = with_deadline(backend.timeout, &backend.counters, "PING", async {
                let mut conn = shard.pool.get().await.map_err(CacheError::unavailable)?;
                let _: String = redis::cmd("PING")
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| backend.counters.redis_error(e))?;
                Ok(())
            })
            .await;
            if let Err(e) = reachable {
                tracing::warn!(shard = %shard.addr, error = %e, "Shard scan pool unreachable");
                coverage = ScanCoverage::Unconfirmed;
            }
        }
        let backend = Self { coverage, ..backend };

        let warm = options.min_idle.min(backend.cluster.status().max_size);
        let opened = futures_util::future::join_all((0..warm).map(|_| backend.cluster.get()))
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count();
        for shard in &backend.shards {
            warm_up(&shard.pool, 1).await;
        }

        tracing::info!(
            shards = backend.shards.len(),
            coverage = ?backend.coverage,
            warm_connections = opened,
            "Redis Cluster backend ready"
        );
        Ok(backend)
    }

    async fn connection(&self) -> CacheResult<deadpool_redis::cluster::Connection> {
        self.cluster.get().await.map_err(CacheError::unavailable)
    }
}

async fn discover_masters(
    cluster: &ClusterPool,
    timeout: Duration,
    counters: &PoolCounters,
) -> CacheResult<Option<Vec<String>>> {
    with_deadline(timeout, counters, "CLUSTER NODES", async {
        let mut conn = cluster.get().await.map_err(CacheError::unavailable)?;
        let nodes: String = redis::cmd("CLUSTER")
            .arg("NODES")
            .query_async(&mut conn)
            .await
            .map_err(|e| counters.redis_error(e))?;
        Ok(parse_cluster_masters(&nodes))
    })
    .await
}

/// Extract healthy master addresses (`host:port`) from `CLUSTER NODES` output.
///
/// Returns `None` when there are no masters or any healthy master lacks an
/// address, since scanning the rest would silently miss its keys.
pub fn parse_cluster_masters(nodes: &str) -> Option<Vec<String>> {
    let mut masters = Vec::new();
    for line in nodes.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_id), Some(addr), Some(flags)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let flags: Vec<&str> = flags.split(',').collect();
        if !flags.contains(&"master")
            || flags
                .iter()
                .any(|flag| matches!(*flag, "fail" | "fail?" | "handshake"))
        {
            continue;
        }
        if flags.contains(&"noaddr") {
            return None;
        }
        let host_port = addr.split(['@', ',']).next().unwrap_or_default();
        match host_port.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !port.is_empty() => {
                masters.push(host_port.to_string());
            }
            _ => return None,
        }
    }
    (!masters.is_empty()).then_some(masters)
}

/// Rewrite the seed URL to point at `host_port`, keeping scheme and credentials.
fn node_url(seed: &str, host_port: &str) -> CacheResult<String> {
    let invalid = |reason: &str| {
        CacheError::configuration(format!("invalid cluster node address {host_port}: {reason}"))
    };
    let mut url = url::Url::parse(seed).map_err(|e| invalid(&e.to_string()))?;
    let (host, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("bad port"))?;
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    url.set_host(Some(&host)).map_err(|e| invalid(&e.to_string()))?;
    url.set_port(Some(port)).map_err(|_| invalid("cannot set port"))?;
    Ok(url.to_string())
}

/// Group keys by the hash slot that owns them, honouring `{hash tags}`.
fn group_by_slot(keys: &[String]) -> BTreeMap<u16, Vec<&String>> {
    let mut by_slot: BTreeMap<u16, Vec<&String>> = BTreeMap::new();
    for key in keys {
        by_slot.entry(get_slot(key.as_bytes())).or_default().push(key);
    }
    by_slot
}

#[async_trait]
impl BackendAdapter for ShardedBackend {
    fn backend_type(&self) -> &'static str {
        "cluster"
    }

    fn topology(&self) -> &BackendTopology {
        &self.topology
    }

    fn scan_coverage(&self) -> ScanCoverage {
        self.coverage
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

    /// Multi-key DEL must not cross slots, so keys are grouped per slot first.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let by_slot = group_by_slot(keys);
        with_deadline(self.timeout, &self.counters, "DEL", async {
            let mut conn = self.connection().await?;
            let mut removed = 0u64;
            for group in by_slot.values() {
                let count: u64 = conn
                    .del(group.as_slice())
                    .await
                    .map_err(|e| self.counters.redis_error(e))?;
                removed += count;
            }
            Ok(removed)
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
        let target = self.shards.get(shard).ok_or_else(|| {
            CacheError::configuration(format!(
                "shard {shard} out of range (cluster has {})",
                self.shards.len()
            ))
        })?;
        let mut conn = with_deadline(self.timeout, &self.counters, "SCAN", async {
            target.pool.get().await.map_err(CacheError::unavailable)
        })
        .await?;
        let keys = scan_to_completion(&mut conn, pattern, self.timeout, &self.counters).await?;
        tracing::debug!(shard = %target.addr, pattern, found = keys.len(), "shard scan complete");
        Ok(keys)
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
        let cluster = self.cluster.status();
        let (total, idle) = self.shards.iter().fold(
            (cluster.size as u64, cluster.available as u64),
            |(total, idle), shard| {
                let status = shard.pool.status();
                (total + status.size as u64, idle + status.available as u64)
            },
        );
        self.counters.snapshot(total, idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004,hostname4 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002,hostname2 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003,hostname3 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005,hostname5 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 127.0.0.1:30006@31006,hostname6 slave 292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 0 1426238317741 6 connected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001,hostname1 myself,master - 0 0 1 connected 0-5460
";

    #[test]
    fn parses_masters_only() {
        let masters = parse_cluster_masters(NODES).unwrap();
        assert_eq!(
            masters,
            vec!["127.0.0.1:30002", "127.0.0.1:30003", "127.0.0.1:30001"]
        );
    }

    #[test]
    fn failed_masters_are_skipped_and_addressless_masters_reject_discovery() {
        let failed = "a 10.0.0.1:7000@17000 master,fail - 0 0 1 disconnected\n\
                      b 10.0.0.2:7000@17000 master - 0 0 2 connected 0-16383\n";
        assert_eq!(parse_cluster_masters(failed).unwrap(), vec!["10.0.0.2:7000"]);

        let addressless = "a :7000@17000 myself,master - 0 0 1 connected 0-16383\n";
        assert_eq!(parse_cluster_masters(addressless), None);
        assert_eq!(parse_cluster_masters(""), None);
    }

    #[test]
    fn node_url_keeps_credentials() {
        assert_eq!(
            node_url("redis://:pw@seed.internal:7000", "10.1.2.3:7001").unwrap(),
            "redis://:pw@10.1.2.3:7001"
        );
        assert_eq!(
            node_url("redis://seed:7000", "::1:7002").unwrap(),
            "redis://[::1]:7002"
        );
        assert!(node_url("redis://seed:7000", "nohostport").is_err());
    }

    #[test]
    fn delete_groups_follow_cluster_slots() {
        assert_eq!(get_slot(b"foo"), 12182);
        assert_eq!(get_slot(b"bar"), 5061);

        let keys: Vec<String> = ["{user1000}.following", "foo", "{user1000}.followers", "bar"]
            .into_iter()
            .map(String::from)
            .collect();
        let groups = group_by_slot(&keys);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&5061], vec!["bar"]);
        assert_eq!(groups[&12182], vec!["foo"]);
        let tagged = get_slot(b"user1000");
        assert_eq!(
            groups[&tagged],
            vec!["{user1000}.following", "{user1000}.followers"]
        );
    }
}
