use serde::Deserialize;

use crate::error::{ContestError, ContestResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `PHOTO_CONTEST__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ballot: BallotConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// TTLs are fractional seconds so that sub-second values can be configured
/// in tests; they are validated by [`AppConfig::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_leaderboard_ttl_secs")]
    pub leaderboard_raw_ttl_secs: f64,
    #[serde(default = "default_leaderboard_ttl_secs")]
    pub leaderboard_enriched_ttl_secs: f64,
    #[serde(default = "default_category_list_ttl_secs")]
    pub category_list_ttl_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BallotConfig {
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,
    #[serde(default)]
    pub dedup_enabled: bool,
    #[serde(default = "default_dedup_max_distance")]
    pub dedup_max_distance: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "contest-01".to_string()
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_key_prefix() -> String {
    "leaderboard".to_string()
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_leaderboard_ttl_secs() -> f64 {
    86_400.0
}
fn default_category_list_ttl_secs() -> f64 {
    300.0
}
fn default_oversample_factor() -> usize {
    crate::types::DEFAULT_OVERSAMPLE_FACTOR
}
fn default_dedup_max_distance() -> u32 {
    6
}
fn default_page_size() -> usize {
    10
}
fn default_store_timeout_ms() -> u64 {
    500
}
fn default_reconcile_interval_secs() -> u64 {
    300
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            connect_timeout_ms: default_connect_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            leaderboard_raw_ttl_secs: default_leaderboard_ttl_secs(),
            leaderboard_enriched_ttl_secs: default_leaderboard_ttl_secs(),
            category_list_ttl_secs: default_category_list_ttl_secs(),
        }
    }
}

impl Default for BallotConfig {
    fn default() -> Self {
        Self {
            oversample_factor: default_oversample_factor(),
            dedup_enabled: false,
            dedup_max_distance: default_dedup_max_distance(),
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            store_timeout_ms: default_store_timeout_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            redis: RedisConfig::default(),
            cache: CacheConfig::default(),
            ballot: BallotConfig::default(),
            leaderboard: LeaderboardConfig::default(),
        }
    }
}

/// Convert a configured TTL in seconds into a [`std::time::Duration`].
pub fn ttl_from_secs(secs: f64) -> ContestResult<std::time::Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ContestError::Configuration(format!(
            "cache ttl must be a non-negative number of seconds, got {secs}"
        )));
    }
    Ok(std::time::Duration::from_secs_f64(secs))
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("PHOTO_CONTEST")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject values that would otherwise surface as runtime misbehavior.
    pub fn validate(&self) -> ContestResult<()> {
        ttl_from_secs(self.cache.leaderboard_raw_ttl_secs)?;
        ttl_from_secs(self.cache.leaderboard_enriched_ttl_secs)?;
        ttl_from_secs(self.cache.category_list_ttl_secs)?;
        if self.cache.sweep_interval_secs == 0 {
            return Err(ContestError::Configuration(
                "cache.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.ballot.oversample_factor == 0 {
            return Err(ContestError::Configuration(
                "ballot.oversample_factor must be greater than zero".to_string(),
            ));
        }
        if self.leaderboard.page_size == 0 {
            return Err(ContestError::Configuration(
                "leaderboard.page_size must be greater than zero".to_string(),
            ));
        }
        if self.leaderboard.store_timeout_ms == 0 {
            return Err(ContestError::Configuration(
                "leaderboard.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.leaderboard.reconcile_interval_secs == 0 {
            return Err(ContestError::Configuration(
                "leaderboard.reconcile_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
