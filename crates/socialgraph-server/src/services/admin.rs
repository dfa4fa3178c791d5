use serde::Serialize;
use socialgraph_cache::{CacheAside, CacheError, InvalidationReport, Scope};

use super::{ServiceError, ServiceResult};

/// One scope that could not be refreshed.
#[derive(Debug)]
pub struct ScopeFailure {
    pub scope: Scope,
    pub error: CacheError,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub user_id: i64,
    pub scopes: Vec<InvalidationReport>,
}

/// Administrative cache operations. Unlike read paths these surface cache errors.
#[derive(Clone)]
pub struct CacheAdmin {
    cache: CacheAside,
}

impl CacheAdmin {
    pub fn new(cache: CacheAside) -> Self {
        Self { cache }
    }

    /// Synchronously invalidate every cached view of one user.
    ///
    /// All scopes are attempted; any failure, partial invalidation included,
    /// fails the call with [`ServiceError::RefreshFailed`].
    pub async fn force_refresh(&self, user_id: i64) -> ServiceResult<RefreshReport> {
        let scopes = [
            Scope::feed(user_id),
            Scope::user_posts(user_id),
            Scope::user_profile(user_id),
        ];

        let mut reports = Vec::with_capacity(scopes.len());
        let mut failures = Vec::new();
        for scope in scopes {
            let outcome = self
                .cache
                .invalidate_scope(&scope)
                .await
                .and_then(InvalidationReport::ensure_complete);
            match outcome {
                Ok(report) => reports.push(report),
                Err(error) => {
                    tracing::warn!(scope = %scope, error = %error, "Cache refresh failed for scope");
                    failures.push(ScopeFailure { scope, error });
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(user_id, "Cache refreshed");
            Ok(RefreshReport {
                user_id,
                scopes: reports,
            })
        } else {
            Err(ServiceError::RefreshFailed { user_id, failures })
        }
    }
}
