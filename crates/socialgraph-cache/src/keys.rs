//! Cache key construction.
//!
//! ## Key Format
//!
//! | Scope         | Entry key                                  |
//! |---------------|--------------------------------------------|
//! | feed          | `feed:user:{id}:page:{n}:size:{m}`         |
//! | user posts    | `posts:user:{id}:page:{n}:size:{m}`        |
//! | user profile  | `user:{id}`                                |
//! | search        | `search:{first}:{last}:page:{n}:size:{m}`  |
//!
//! Version counters live at `cache_version:{scope prefix}` and versioned entries
//! append `:v{version}`. Pattern invalidation sweeps `{scope prefix}:*`.
//!
//! Free-text segments are percent-encoded, so `:` and glob metacharacters in a
//! search term can neither collide with another key nor widen a pattern.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default page size applied when the requested one is out of range.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size that may appear in a key.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Resource classes with their own TTL and namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Feed,
    UserPosts,
    UserProfile,
    Search,
    CacheVersion,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::UserPosts => "user_posts",
            Self::UserProfile => "user_profile",
            Self::Search => "search",
            Self::CacheVersion => "cache_version",
        }
    }

    /// Leading key segment.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::UserPosts => "posts",
            Self::UserProfile => "user",
            Self::Search => "search",
            Self::CacheVersion => "cache_version",
        }
    }

    /// Whether entries of this kind exist once per page/size combination.
    pub fn is_paged(&self) -> bool {
        matches!(self, Self::Feed | Self::UserPosts | Self::Search)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invalidation scope: a resource kind plus the identity it is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Feed { user_id: i64 },
    UserPosts { user_id: i64 },
    UserProfile { user_id: i64 },
    Search { first_name: String, last_name: String },
}

impl Scope {
    pub fn feed(user_id: i64) -> Self {
        Self::Feed { user_id }
    }

    pub fn user_posts(user_id: i64) -> Self {
        Self::UserPosts { user_id }
    }

    pub fn user_profile(user_id: i64) -> Self {
        Self::UserProfile { user_id }
    }

    pub fn search(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self::Search {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Feed { .. } => ResourceKind::Feed,
            Self::UserPosts { .. } => ResourceKind::UserPosts,
            Self::UserProfile { .. } => ResourceKind::UserProfile,
            Self::Search { .. } => ResourceKind::Search,
        }
    }

    /// Fixed prefix shared by every entry of this scope.
    pub fn prefix(&self) -> String {
        let ns = self.kind().namespace();
        match self {
            Self::Feed { user_id } | Self::UserPosts { user_id } => format!("{ns}:user:{user_id}"),
            Self::UserProfile { user_id } => format!("{ns}:{user_id}"),
            Self::Search {
                first_name,
                last_name,
            } => format!(
                "{ns}:{}:{}",
                urlencoding::encode(first_name),
                urlencoding::encode(last_name)
            ),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// A clamped page selector. Construct through [`PageRequest::clamped`] so keys stay bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    /// Pages below 1 become 1; sizes outside `1..=100` become 20.
    pub fn clamped(page: i64, size: i64) -> Self {
        let page = page.clamp(1, u32::MAX as i64) as u32;
        let size = if (1..=MAX_PAGE_SIZE as i64).contains(&size) {
            size as u32
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self { page, size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Row limit for the system-of-record query.
    pub fn limit(&self) -> i64 {
        self.size as i64
    }

    /// Row offset for the system-of-record query.
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.size as i64
    }

    /// Number of pages needed for `total` rows.
    pub fn pages_for(&self, total: i64) -> i64 {
        let size = self.size as i64;
        (total.max(0) + size - 1) / size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// An immutable, fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deterministic key construction. Every function is pure.
pub struct KeyNamespace;

impl KeyNamespace {
    /// Entry key for a scope, with the page selector appended when given.
    pub fn entry(scope: &Scope, page: Option<PageRequest>) -> CacheKey {
        let prefix = scope.prefix();
        match page {
            Some(page) if scope.kind().is_paged() => {
                CacheKey(format!("{prefix}:page:{}:size:{}", page.page, page.size))
            }
            _ => CacheKey(prefix),
        }
    }

    /// Glob matching every paged entry of a scope, versioned or not.
    pub fn pattern(scope: &Scope) -> String {
        format!("{}:*", scope.prefix())
    }

    /// Key of the version counter for a scope.
    pub fn version_counter(scope: &Scope) -> CacheKey {
        CacheKey(format!(
            "{}:{}",
            ResourceKind::CacheVersion.namespace(),
            scope.prefix()
        ))
    }

    /// Qualify an entry key with a scope version.
    pub fn versioned(key: &CacheKey, version: u64) -> CacheKey {
        CacheKey(format!("{}:v{version}", key.0))
    }
}
