use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub redis: RedisConfig,
    pub leaderboard: LeaderboardConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Comma-separated seed nodes when `redis_cluster` is set
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default)]
    pub redis_cluster: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default = "default_key_prefix")]
    pub leaderboard_key_prefix: String,
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Upper bound accepted by `Start`
    #[serde(default = "default_max_concurrency")]
    pub generation_max_concurrency: u64,
    /// Users generated by the standalone binary run
    #[serde(default = "default_generate_users")]
    pub generate_users: u64,
    #[serde(default = "default_generate_concurrency")]
    pub generate_concurrency: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
}

fn default_service_name() -> String {
    "leaderboard-service".to_string()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_log_format() -> LogFormat {
    LogFormat::Plain
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "USER_RANKING_".to_string()
}

fn default_page_size() -> i64 {
    10
}

fn default_max_page_size() -> i64 {
    100
}

fn default_max_concurrency() -> u64 {
    64
}

fn default_generate_users() -> u64 {
    1000
}

fn default_generate_concurrency() -> u64 {
    4
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            leaderboard_key_prefix: default_key_prefix(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            generation_max_concurrency: default_max_concurrency(),
            generate_users: default_generate_users(),
            generate_concurrency: default_generate_concurrency(),
            status_poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config {
            service: envy::from_env::<ServiceConfig>()?,
            redis: envy::from_env::<RedisConfig>()?,
            leaderboard: envy::from_env::<LeaderboardConfig>()?,
            generation: envy::from_env::<GenerationConfig>()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.leaderboard.default_page_size < 1 {
            return Err(ConfigError::Invalid(
                "DEFAULT_PAGE_SIZE must be at least 1".to_string(),
            ));
        }
        if self.leaderboard.max_page_size < self.leaderboard.default_page_size {
            return Err(ConfigError::Invalid(
                "MAX_PAGE_SIZE must not be smaller than DEFAULT_PAGE_SIZE".to_string(),
            ));
        }
        if self.generation.generation_max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "GENERATION_MAX_CONCURRENCY must be positive".to_string(),
            ));
        }
        if self.generation.generate_users == 0 {
            return Err(ConfigError::Invalid(
                "GENERATE_USERS must be positive".to_string(),
            ));
        }
        if self.generation.generate_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "GENERATE_CONCURRENCY must be positive".to_string(),
            ));
        }
        if self.generation.status_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "STATUS_POLL_INTERVAL_MS must be positive".to_string(),
            ));
        }
        if self.generation.generate_concurrency > self.generation.generation_max_concurrency {
            return Err(ConfigError::Invalid(format!(
                "GENERATE_CONCURRENCY {} exceeds GENERATION_MAX_CONCURRENCY {}",
                self.generation.generate_concurrency, self.generation.generation_max_concurrency
            )));
        }
        if self.service.store_backend == StoreBackend::Redis
            && self.redis.redis_url.split(',').all(|node| node.trim().is_empty())
        {
            return Err(ConfigError::Invalid("REDIS_URL must not be empty".to_string()));
        }
        Ok(())
    }
}
