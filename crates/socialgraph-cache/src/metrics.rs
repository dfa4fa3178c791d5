//! Observability port for cache outcomes.
//!
//! The core never touches a global registry; the application injects a sink.

use crate::invalidation::InvalidationStrategy;
use crate::keys::ResourceKind;

pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, kind: ResourceKind);

    fn record_miss(&self, kind: ResourceKind);

    fn record_invalidation(&self, kind: ResourceKind, strategy: InvalidationStrategy);

    /// A detached population failed to write its entry.
    fn record_population_failure(&self, _kind: ResourceKind) {}
}

/// Sink that drops every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    fn record_hit(&self, _kind: ResourceKind) {}

    fn record_miss(&self, _kind: ResourceKind) {}

    fn record_invalidation(&self, _kind: ResourceKind, _strategy: InvalidationStrategy) {}
}
