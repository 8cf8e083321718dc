//! Application configuration, resolved from the environment.
//!
//! Every knob has an environment key and a default; `AppConfig::from_env`
//! reads the process environment, and `from_lookup` takes an arbitrary
//! lookup function so tests can exercise parsing without touching global
//! state.

use simdoc_core::config::SimilarityConfig;
use std::fmt;
use std::str::FromStr;

/// Which document-store backend to wire up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Elasticsearch over HTTP -- the production backend.
    Elasticsearch,
    /// In-process store for development and tests.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "elasticsearch" => Ok(Self::Elasticsearch),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::invalid("STORE_BACKEND", other)),
        }
    }
}

/// Which job-queue backend to wire up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Redis list + side storage -- the production backend.
    Redis,
    /// In-process queue for development and tests.
    Memory,
}

impl FromStr for QueueBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::invalid("QUEUE_BACKEND", other)),
        }
    }
}

/// Elasticsearch connection and index settings.
#[derive(Debug, Clone)]
pub struct EsConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index_prefix: String,
    pub articles_index: String,
    pub clusters_index: String,
}

impl EsConfig {
    /// Base URL of the cluster, without credentials.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full articles index name: `<prefix>_<index>`.
    #[must_use]
    pub fn articles_index_full(&self) -> String {
        format!("{}_{}", self.index_prefix, self.articles_index)
    }

    /// Full clusters index name: `<prefix>_<index>`.
    #[must_use]
    pub fn clusters_index_full(&self) -> String {
        format!("{}_{}", self.index_prefix, self.clusters_index)
    }
}

/// Redis connection and queue settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub queue_name: String,
}

impl RedisConfig {
    /// Connection URL, with the password inlined when configured.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub elasticsearch: EsConfig,
    pub redis: RedisConfig,
    pub similarity: SimilarityConfig,
    pub api_v1_prefix: String,
    pub cors_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub queue_backend: QueueBackend,
}

/// Configuration value that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
}

impl ConfigError {
    fn invalid(key: &str, value: impl fmt::Display) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a present value fails to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let similarity = SimilarityConfig {
            simhash_bit_size: parse(&lookup, "SIMHASH_BIT_SIZE", 64)?,
            minhash_permutations: parse(&lookup, "MINHASH_PERMUTATIONS", 128)?,
            minhash_bands: parse(&lookup, "MINHASH_BANDS", 20)?,
            minhash_rows_per_band: parse(&lookup, "MINHASH_ROWS_PER_BAND", 6)?,
            shingle_size: parse(&lookup, "SHINGLE_SIZE", 5)?,
            similarity_threshold: parse(&lookup, "SIMILARITY_THRESHOLD", 0.8)?,
        };

        Ok(Self {
            app_name: string(&lookup, "APP_NAME", "sim-doc-cluster"),
            app_version: string(&lookup, "APP_VERSION", env!("CARGO_PKG_VERSION")),
            debug: parse(&lookup, "DEBUG", false)?,
            host: string(&lookup, "HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 8000)?,
            elasticsearch: EsConfig {
                host: string(&lookup, "ES_HOST", "localhost"),
                port: parse(&lookup, "ES_PORT", 9200)?,
                username: optional(&lookup, "ES_USERNAME"),
                password: optional(&lookup, "ES_PASSWORD"),
                index_prefix: string(&lookup, "ES_INDEX_PREFIX", "sim_doc"),
                articles_index: string(&lookup, "ES_ARTICLES_INDEX", "articles"),
                clusters_index: string(&lookup, "ES_CLUSTERS_INDEX", "clusters"),
            },
            redis: RedisConfig {
                host: string(&lookup, "REDIS_HOST", "localhost"),
                port: parse(&lookup, "REDIS_PORT", 6379)?,
                db: parse(&lookup, "REDIS_DB", 0)?,
                password: optional(&lookup, "REDIS_PASSWORD"),
                queue_name: string(&lookup, "REDIS_QUEUE_NAME", "similarity_jobs"),
            },
            similarity,
            api_v1_prefix: string(&lookup, "API_V1_PREFIX", "/api/v1"),
            cors_origins: list(&lookup, "CORS_ORIGINS", "*"),
            store_backend: parse(&lookup, "STORE_BACKEND", StoreBackend::Elasticsearch)?,
            queue_backend: parse(&lookup, "QUEUE_BACKEND", QueueBackend::Redis)?,
        })
    }

    /// Socket address string the API server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn string<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.is_empty())
}

fn list<F>(lookup: &F, key: &str, default: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    string(lookup, key, default)
        .split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, raw)),
        None => Ok(default),
    }
}
