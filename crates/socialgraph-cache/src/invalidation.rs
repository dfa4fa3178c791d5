//! Scope invalidation.
//!
//! ## Strategies
//!
//! - **Pattern delete**: enumerate `{scope}:*` on every shard, then DEL in
//!   batches of [`DELETE_BATCH_SIZE`]. Best effort: a failed batch is logged
//!   and the remaining batches still run. Survivors expire with their TTL.
//! - **Version bump**: INCR `cache_version:{scope}`. Every key built for the
//!   scope afterwards embeds the new version, so older entries become
//!   unreachable and are left for TTL/eviction to reclaim. O(1) per scope.
//!
//! The strategy is chosen once per deployment from the configured setting and
//! the backend topology; see [`InvalidationStrategy::select`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendAdapter, BackendTopology, ScanCoverage};
use crate::error::{CacheError, CacheResult};
use crate::keys::{CacheKey, KeyNamespace, PageRequest, Scope};
use crate::metrics::CacheMetrics;

/// Keys per DEL round-trip during pattern invalidation.
pub const DELETE_BATCH_SIZE: usize = 100;

/// Configured invalidation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategySetting {
    /// Pattern delete on unsharded backends, version bump on sharded ones.
    #[default]
    Auto,
    Pattern,
    Version,
}

impl FromStr for StrategySetting {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "pattern" => Ok(Self::Pattern),
            "version" => Ok(Self::Version),
            other => Err(CacheError::configuration(format!(
                "unknown invalidation strategy '{other}' (expected auto, pattern or version)"
            ))),
        }
    }
}

/// Strategy in effect for a running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationStrategy {
    PatternDelete,
    VersionBump,
}

impl InvalidationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternDelete => "pattern_delete",
            Self::VersionBump => "version_bump",
        }
    }

    /// Resolve the configured setting against the backend.
    ///
    /// Pattern delete on a sharded backend requires confirmed full scan
    /// coverage; without it the request is downgraded to version bump.
    pub fn select(
        setting: StrategySetting,
        topology: &BackendTopology,
        coverage: ScanCoverage,
    ) -> Self {
        match setting {
            StrategySetting::Version => Self::VersionBump,
            StrategySetting::Auto if topology.is_sharded() => Self::VersionBump,
            StrategySetting::Auto => Self::PatternDelete,
            StrategySetting::Pattern
                if topology.is_sharded() && coverage != ScanCoverage::Full =>
            {
                tracing::warn!(
                    shards = topology.shard_count(),
                    "Pattern invalidation requested but full multi-shard scan coverage is not \
                     confirmed; downgrading to version bump"
                );
                Self::VersionBump
            }
            StrategySetting::Pattern => Self::PatternDelete,
        }
    }
}

impl fmt::Display for InvalidationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one scope invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub scope: String,
    pub strategy: InvalidationStrategy,
    pub keys_matched: usize,
    pub keys_deleted: u64,
    pub batches: usize,
    pub failed_batches: usize,
    /// Version now in effect, for version bumps.
    pub new_version: Option<u64>,
}

impl InvalidationReport {
    fn new(scope: &Scope, strategy: InvalidationStrategy) -> Self {
        Self {
            scope: scope.prefix(),
            strategy,
            keys_matched: 0,
            keys_deleted: 0,
            batches: 0,
            failed_batches: 0,
            new_version: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0
    }

    /// Turn a partial pattern delete into [`CacheError::PartialInvalidation`].
    pub fn ensure_complete(self) -> CacheResult<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(CacheError::PartialInvalidation {
                pattern: format!("{}:*", self.scope),
                failed_batches: self.failed_batches,
                total_batches: self.batches,
            })
        }
    }
}

pub struct InvalidationEngine {
    backend: Arc<dyn BackendAdapter>,
    strategy: InvalidationStrategy,
    metrics: Arc<dyn CacheMetrics>,
}

impl InvalidationEngine {
    pub fn new(
        backend: Arc<dyn BackendAdapter>,
        setting: StrategySetting,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        let strategy =
            InvalidationStrategy::select(setting, backend.topology(), backend.scan_coverage());
        tracing::info!(
            backend = backend.backend_type(),
            ?setting,
            strategy = %strategy,
            "Cache invalidation strategy selected"
        );
        Self {
            backend,
            strategy,
            metrics,
        }
    }

    pub fn strategy(&self) -> InvalidationStrategy {
        self.strategy
    }

    /// Current version of a scope. An absent counter reads as 0.
    pub async fn current_version(&self, scope: &Scope) -> CacheResult<u64> {
        let counter = KeyNamespace::version_counter(scope);
        match self.backend.get(counter.as_str()).await? {
            None => Ok(0),
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| CacheError::decode(counter.as_str(), "version counter is not an integer")),
        }
    }

    /// Key a read should use for this scope under the active strategy.
    pub async fn resolve_key(&self, scope: &Scope, page: Option<PageRequest>) -> CacheResult<CacheKey> {
        let key = KeyNamespace::entry(scope, page);
        match self.strategy {
            InvalidationStrategy::PatternDelete => Ok(key),
            InvalidationStrategy::VersionBump => {
                let version = self.current_version(scope).await?;
                Ok(KeyNamespace::versioned(&key, version))
            }
        }
    }

    /// Evict every entry of a scope.
    ///
    /// Fails only when the scan (pattern delete) or the counter bump (version
    /// bump) fails. Failed delete batches are reported in the returned
    /// [`InvalidationReport`] rather than as an error.
    pub async fn invalidate_scope(&self, scope: &Scope) -> CacheResult<InvalidationReport> {
        let report = match self.strategy {
            InvalidationStrategy::PatternDelete => self.delete_by_pattern(scope).await?,
            InvalidationStrategy::VersionBump => self.bump_version(scope).await?,
        };
        self.metrics.record_invalidation(scope.kind(), self.strategy);
        Ok(report)
    }

    async fn delete_by_pattern(&self, scope: &Scope) -> CacheResult<InvalidationReport> {
        let mut report = InvalidationReport::new(scope, InvalidationStrategy::PatternDelete);

        let keys = if scope.kind().is_paged() {
            let pattern = KeyNamespace::pattern(scope);
            let keys = self.backend.scan_keys_matching(&pattern).await?;
            tracing::debug!(pattern = %pattern, matched = keys.len(), "scanned keys for invalidation");
            keys
        } else {
            vec![KeyNamespace::entry(scope, None).into_string()]
        };
        report.keys_matched = keys.len();

        for (index, batch) in keys.chunks(DELETE_BATCH_SIZE).enumerate() {
            report.batches += 1;
            match self.backend.delete(batch).await {
                Ok(removed) => report.keys_deleted += removed,
                Err(e) => {
                    report.failed_batches += 1;
                    tracing::warn!(
                        scope = %scope,
                        batch = index,
                        batch_len = batch.len(),
                        error = %e,
                        "Failed to delete invalidation batch"
                    );
                }
            }
        }

        if !report.is_complete() {
            tracing::warn!(
                scope = %scope,
                failed_batches = report.failed_batches,
                batches = report.batches,
                "Partial invalidation; remaining entries expire with their TTL"
            );
        } else {
            tracing::debug!(scope = %scope, deleted = report.keys_deleted, "scope invalidated");
        }
        Ok(report)
    }

    async fn bump_version(&self, scope: &Scope) -> CacheResult<InvalidationReport> {
        let counter = KeyNamespace::version_counter(scope);
        let version = self.backend.incr(counter.as_str()).await?;
        tracing::debug!(scope = %scope, version, "cache version bumped");

        let mut report = InvalidationReport::new(scope, InvalidationStrategy::VersionBump);
        report.new_version = Some(version);
        Ok(report)
    }
}
