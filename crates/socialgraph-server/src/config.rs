use serde::{Deserialize, Serialize};
use socialgraph_cache::{PoolOptions, StrategySetting, TtlPolicy};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache TTLs and invalidation strategy
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Redis validations
        if self.redis.cluster_mode && self.redis.cluster_nodes.is_empty() {
            return Err("redis.cluster_mode=true requires at least one redis.cluster_nodes entry".into());
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.redis.min_idle_conns > self.redis.pool_size {
            return Err("redis.min_idle_conns must be <= redis.pool_size".into());
        }
        if self.redis.timeout_ms == 0 {
            return Err("redis.timeout_ms must be > 0".into());
        }
        // Cache validations
        let ttls = [
            ("cache.feed_ttl_secs", self.cache.feed_ttl_secs),
            ("cache.user_posts_ttl_secs", self.cache.user_posts_ttl_secs),
            ("cache.user_profile_ttl_secs", self.cache.user_profile_ttl_secs),
            ("cache.search_ttl_secs", self.cache.search_ttl_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, ttl)| *ttl == 0) {
            return Err(format!("{name} must be > 0"));
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades to the in-process cache without it)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Single-node connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connect to a Redis Cluster through `cluster_nodes` instead of `url`
    #[serde(default)]
    pub cluster_mode: bool,

    /// Cluster seed nodes, as URLs or `host:port`
    #[serde(default)]
    pub cluster_nodes: Vec<String>,

    /// Applied to every URL that does not carry its own credentials
    #[serde(default)]
    pub password: Option<String>,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connections opened at startup
    #[serde(default = "default_redis_min_idle_conns")]
    pub min_idle_conns: usize,

    /// Deadline for every backend call in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_min_idle_conns() -> usize {
    2
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            cluster_mode: false,
            cluster_nodes: Vec::new(),
            password: None,
            pool_size: default_redis_pool_size(),
            min_idle_conns: default_redis_min_idle_conns(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.pool_size,
            min_idle: self.min_idle_conns,
            command_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Single-node URL with the configured password applied.
    pub fn node_url(&self) -> String {
        with_password(&self.url, self.password.as_deref())
    }

    /// Cluster seed URLs with scheme and password applied.
    pub fn cluster_urls(&self) -> Vec<String> {
        self.cluster_nodes
            .iter()
            .map(|node| node.trim())
            .filter(|node| !node.is_empty())
            .map(|node| {
                let url = if node.contains("://") {
                    node.to_string()
                } else {
                    format!("redis://{node}")
                };
                with_password(&url, self.password.as_deref())
            })
            .collect()
    }
}

fn with_password(raw: &str, password: Option<&str>) -> String {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return raw.to_string();
    };
    match url::Url::parse(raw) {
        Ok(mut url) if url.password().is_none() => match url.set_password(Some(password)) {
            Ok(()) => url.to_string(),
            Err(()) => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

/// Cache TTLs and invalidation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_feed_ttl_secs")]
    pub feed_ttl_secs: u64,
    #[serde(default = "default_user_posts_ttl_secs")]
    pub user_posts_ttl_secs: u64,
    #[serde(default = "default_user_profile_ttl_secs")]
    pub user_profile_ttl_secs: u64,
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,
    /// `auto`, `pattern` or `version`
    #[serde(default)]
    pub invalidation_strategy: StrategySetting,
}

fn default_feed_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_user_posts_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_user_profile_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_search_ttl_secs() -> u64 {
    120 // 2 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_ttl_secs: default_feed_ttl_secs(),
            user_posts_ttl_secs: default_user_posts_ttl_secs(),
            user_profile_ttl_secs: default_user_profile_ttl_secs(),
            search_ttl_secs: default_search_ttl_secs(),
            invalidation_strategy: StrategySetting::default(),
        }
    }
}

impl CacheConfig {
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            feed: Duration::from_secs(self.feed_ttl_secs),
            user_posts: Duration::from_secs(self.user_posts_ttl_secs),
            user_profile: Duration::from_secs(self.user_profile_ttl_secs),
            search: Duration::from_secs(self.search_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "socialgraph.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SOCIALGRAPH__REDIS__CLUSTER_MODE=true
        builder = builder.add_source(
            Environment::with_prefix("SOCIALGRAPH")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("redis.cluster_nodes"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
