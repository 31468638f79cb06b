//! Engine-wide configuration.
//!
//! Mirrors `clickgraph::config::ServerConfig`'s env-var-plus-validation
//! shape, but scoped to the things this crate actually controls: which
//! collection strategy to use by default, how much to log, and the pool
//! sizing handed to the `Driver` on construction. There is no CLI surface
//! (this crate has no binary) — only `from_env`/`Default`/builder methods.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unknown collection strategy: {0}")]
    UnknownStrategy(String),
}

/// One of the three interchangeable one-to-many aggregation mechanisms
/// (spec.md §4.5). `Cte` is the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStrategy {
    Cte,
    TempTable,
    Lateral,
}

impl Default for CollectionStrategy {
    fn default() -> Self {
        CollectionStrategy::Cte
    }
}

impl FromStr for CollectionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cte" => Ok(CollectionStrategy::Cte),
            "temptable" | "temp_table" => Ok(CollectionStrategy::TempTable),
            "lateral" => Ok(CollectionStrategy::Lateral),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Per-query options, overridable per-plan via `with_query_options` (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub collection_strategy: CollectionStrategy,
    pub log_queries: bool,
    pub log_parameters: bool,
    pub log_execution_time: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            collection_strategy: CollectionStrategy::default(),
            log_queries: false,
            log_parameters: false,
            log_execution_time: false,
        }
    }
}

/// Engine configuration: pool sizing plus the default `QueryOptions`.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct EngineConfig {
    #[validate(range(min = 1, max = 1000, message = "pool size must be between 1 and 1000"))]
    pub pool_max_size: usize,

    #[validate(range(min = 1, message = "statement parameter ceiling must be positive"))]
    pub max_statement_params: usize,

    #[serde(default)]
    pub query_options: QueryOptionsConfig,
}

/// Serializable mirror of `QueryOptions` (kept separate so `EngineConfig`
/// derives `Validate` cleanly; `CollectionStrategy` has nothing to
/// validate against a numeric range).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryOptionsConfig {
    pub collection_strategy: CollectionStrategy,
    pub log_queries: bool,
    pub log_parameters: bool,
    pub log_execution_time: bool,
}

impl From<QueryOptionsConfig> for QueryOptions {
    fn from(c: QueryOptionsConfig) -> Self {
        Self {
            collection_strategy: c.collection_strategy,
            log_queries: c.log_queries,
            log_parameters: c.log_parameters,
            log_execution_time: c.log_execution_time,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_max_size: 16,
            // Design default from spec.md §4.7: PostgreSQL's 65,535 bound param ceiling.
            max_statement_params: 65_535,
            query_options: QueryOptionsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build configuration from `RELORM_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            pool_max_size: parse_env_var("RELORM_POOL_MAX_SIZE", "16")?,
            max_statement_params: parse_env_var("RELORM_MAX_STATEMENT_PARAMS", "65535")?,
            query_options: QueryOptionsConfig {
                collection_strategy: env::var("RELORM_COLLECTION_STRATEGY")
                    .ok()
                    .map(|s| s.parse())
                    .transpose()?
                    .unwrap_or_default(),
                log_queries: parse_env_var("RELORM_LOG_QUERIES", "false")?,
                log_parameters: parse_env_var("RELORM_LOG_PARAMETERS", "false")?,
                log_execution_time: parse_env_var("RELORM_LOG_EXECUTION_TIME", "false")?,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_env_var<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
