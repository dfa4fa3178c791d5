//! Prometheus metrics for the social-graph server.
//!
//! The cache core reports through the [`CacheMetrics`] port; this module
//! implements that port over the `metrics` facade and serves the Prometheus
//! exposition text.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use socialgraph_cache::{CacheMetrics, CacheStats, InvalidationStrategy, ResourceKind};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const CACHE_POPULATION_FAILURES_TOTAL: &str = "cache_population_failures_total";

    // Backend pool gauges
    pub const CACHE_POOL_CONNECTIONS_TOTAL: &str = "cache_pool_connections_total";
    pub const CACHE_POOL_CONNECTIONS_IDLE: &str = "cache_pool_connections_idle";
}

fn describe() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Cache-aside reads served from the cache");
    describe_counter!(
        names::CACHE_MISSES_TOTAL,
        "Cache-aside reads that fell through to the system of record"
    );
    describe_counter!(
        names::CACHE_INVALIDATIONS_TOTAL,
        "Scope invalidations completed, by resource kind and strategy"
    );
    describe_counter!(
        names::CACHE_POPULATION_FAILURES_TOTAL,
        "Detached cache writes that failed after a miss"
    );
    describe_gauge!(names::CACHE_POOL_CONNECTIONS_TOTAL, "Open backend connections");
    describe_gauge!(names::CACHE_POOL_CONNECTIONS_IDLE, "Idle backend connections");
}

/// Install the Prometheus recorder and register metric descriptions.
///
/// Returns `false` when a recorder is already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            return false;
        }
    };
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        return false;
    }

    describe();
    tracing::info!("Prometheus metrics initialized");
    true
}

/// Prometheus exposition text, or `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

/// [`CacheMetrics`] over the process-wide `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusCacheMetrics;

impl CacheMetrics for PrometheusCacheMetrics {
    fn record_hit(&self, kind: ResourceKind) {
        counter!(names::CACHE_HITS_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    fn record_miss(&self, kind: ResourceKind) {
        counter!(names::CACHE_MISSES_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    fn record_invalidation(&self, kind: ResourceKind, strategy: InvalidationStrategy) {
        counter!(
            names::CACHE_INVALIDATIONS_TOTAL,
            "kind" => kind.as_str(),
            "strategy" => strategy.as_str()
        )
        .increment(1);
    }

    fn record_population_failure(&self, kind: ResourceKind) {
        counter!(names::CACHE_POPULATION_FAILURES_TOTAL, "kind" => kind.as_str()).increment(1);
    }
}

/// Record backend pool gauges.
pub fn record_pool_stats(stats: &CacheStats) {
    let backend = stats.backend_type.clone();
    gauge!(names::CACHE_POOL_CONNECTIONS_TOTAL, "backend" => backend.clone())
        .set(stats.total_conns as f64);
    gauge!(names::CACHE_POOL_CONNECTIONS_IDLE, "backend" => backend).set(stats.idle_conns as f64);
}
