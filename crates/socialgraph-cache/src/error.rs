use std::fmt::Display;

use thiserror::Error;

/// Error taxonomy of the cache coordination layer.
///
/// None of these conditions is fatal. Read paths treat every variant as a miss
/// and fall back to the system of record; only explicit administrative calls
/// surface them to their caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache miss: {key}")]
    Miss { key: String },

    #[error("failed to decode cached value for {key}: {message}")]
    Decode { key: String, message: String },

    #[error("cache backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to serialize value for {key}: {message}")]
    Serialization { key: String, message: String },

    #[error(
        "partial invalidation of {pattern}: {failed_batches} of {total_batches} delete batches failed"
    )]
    PartialInvalidation {
        pattern: String,
        failed_batches: usize,
        total_batches: usize,
    },

    #[error("cache configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    pub fn miss(key: impl Into<String>) -> Self {
        Self::Miss { key: key.into() }
    }

    pub fn decode(key: impl Into<String>, err: impl Display) -> Self {
        Self::Decode {
            key: key.into(),
            message: err.to_string(),
        }
    }

    pub fn unavailable(err: impl Display) -> Self {
        Self::BackendUnavailable(err.to_string())
    }

    pub fn serialization(key: impl Into<String>, err: impl Display) -> Self {
        Self::Serialization {
            key: key.into(),
            message: err.to_string(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Miss { .. } => ErrorCategory::Miss,
            Self::Decode { .. } => ErrorCategory::Corruption,
            Self::BackendUnavailable(_) => ErrorCategory::Connectivity,
            Self::Serialization { .. } => ErrorCategory::Programming,
            Self::PartialInvalidation { .. } => ErrorCategory::Degraded,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Miss,
    Corruption,
    Connectivity,
    Programming,
    Degraded,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::Corruption => write!(f, "corruption"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::Programming => write!(f, "programming"),
            Self::Degraded => write!(f, "degraded"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
