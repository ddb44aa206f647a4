//! Configuration management for the DAU pipeline
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults. It also resolves
//! the deployment context (test, dev, live) a service runs under to the
//! config file that belongs to it.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `max_batch_size`; larger batches exceed store request limits
pub const MAX_BATCH_SIZE_LIMIT: usize = 1_024;

/// Upper bound for `bucket_count`
pub const MAX_BUCKET_COUNT: u32 = 4_096;

/// Canonical daily count query; `{table}` is substituted at load time
pub const DAILY_COUNT_TEMPLATE: &str =
    "SELECT count(userID) as count FROM {table} WHERE pid=? AND day=? AND bucketID_day=?";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Query shape
    #[serde(default)]
    pub query: QueryConfig,

    /// Execution bounds
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Maximum concurrently held sessions
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long to wait for a free session, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

/// Query configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Table indexed by (pid, day, bucketID_day)
    #[serde(default = "default_table")]
    pub table: String,

    /// Full template override; `None` uses [`DAILY_COUNT_TEMPLATE`]
    #[serde(default)]
    pub template: Option<String>,

    /// Number of hash buckets each day is spread across
    #[serde(default = "default_bucket_count")]
    pub bucket_count: u32,
}

/// Execution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum statements per chunk
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Days processed concurrently
    #[serde(default = "default_day_parallelism")]
    pub day_parallelism: usize,

    /// Per-chunk timeout in milliseconds (0 = none)
    #[serde(default)]
    pub chunk_timeout_ms: u64,
}

// Default value functions
fn default_pool_size() -> u32 { 16 }
fn default_acquire_timeout_ms() -> u64 { 5_000 }
fn default_table() -> String { "user_activity_by_day".to_string() }
fn default_bucket_count() -> u32 { 16 }
fn default_max_batch_size() -> usize { 32 }
fn default_day_parallelism() -> usize { 1 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            template: None,
            bucket_count: default_bucket_count(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            day_parallelism: default_day_parallelism(),
            chunk_timeout_ms: 0,
        }
    }
}

impl StoreConfig {
    /// Session acquire timeout as a `Duration`
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl QueryConfig {
    /// Resolved query text
    pub fn template_text(&self) -> String {
        match &self.template {
            Some(t) => t.clone(),
            None => DAILY_COUNT_TEMPLATE.replace("{table}", &self.table),
        }
    }
}

impl ExecutionConfig {
    /// Per-chunk timeout, if configured
    pub fn chunk_timeout(&self) -> Option<Duration> {
        (self.chunk_timeout_ms > 0).then(|| Duration::from_millis(self.chunk_timeout_ms))
    }
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides, then validate
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DAU_MAX_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                self.execution.max_batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("DAU_DAY_PARALLELISM") {
            if let Ok(n) = v.parse() {
                self.execution.day_parallelism = n;
            }
        }
        if let Ok(v) = std::env::var("DAU_BUCKET_COUNT") {
            if let Ok(n) = v.parse() {
                self.query.bucket_count = n;
            }
        }
        if let Ok(table) = std::env::var("DAU_TABLE") {
            self.query.table = table;
        }
        if let Ok(v) = std::env::var("DAU_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.store.pool_size = n;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Error> {
        let fail = |msg: String| -> Result<(), Error> { Err(Error::Configuration(msg)) };

        if self.execution.max_batch_size == 0 {
            return fail("max_batch_size must be > 0".to_string());
        }
        if self.execution.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return fail(format!(
                "max_batch_size {} exceeds maximum allowed {}",
                self.execution.max_batch_size, MAX_BATCH_SIZE_LIMIT
            ));
        }
        if self.execution.day_parallelism == 0 {
            return fail("day_parallelism must be > 0".to_string());
        }
        if self.query.bucket_count == 0 || self.query.bucket_count > MAX_BUCKET_COUNT {
            return fail(format!(
                "bucket_count {} is out of range [1, {}]",
                self.query.bucket_count, MAX_BUCKET_COUNT
            ));
        }
        if self.query.template.is_none() && self.query.table.trim().is_empty() {
            return fail("table cannot be empty".to_string());
        }
        if self.store.pool_size == 0 {
            return fail("pool_size must be > 0".to_string());
        }
        if self.store.acquire_timeout_ms == 0 {
            return fail("acquire_timeout_ms must be > 0".to_string());
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}

// ============================================================================
// Deployment Context Resolution
// ============================================================================

/// Deployment a service instance runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentContext {
    /// Test deployment
    Test,
    /// Development deployment
    Dev,
    /// Production deployment
    Live,
}

impl DeploymentContext {
    /// Suffix used in context paths and config file names
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentContext::Test => "test",
            DeploymentContext::Dev => "dev",
            DeploymentContext::Live => "live",
        }
    }
}

impl fmt::Display for DeploymentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a context path such as `/myapp_live` to its config file
///
/// Config files live at `<config_dir>/<app>_<context>_config.toml`.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    app_name: String,
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for `app_name` reading from `config_dir`
    pub fn new(app_name: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: app_name.into(),
            config_dir: config_dir.into(),
        }
    }

    /// Parse a context path into a deployment context
    pub fn resolve_context(&self, context_path: &str) -> Result<DeploymentContext, Error> {
        let name = context_path.strip_prefix('/').unwrap_or(context_path);
        let suffix = name
            .strip_prefix(self.app_name.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(|| {
                Error::Configuration(format!("Unknown deployment context: {:?}", context_path))
            })?;

        match suffix {
            "test" => Ok(DeploymentContext::Test),
            "dev" => Ok(DeploymentContext::Dev),
            "live" => Ok(DeploymentContext::Live),
            _ => Err(Error::Configuration(format!(
                "Unknown deployment context: {:?}",
                context_path
            ))),
        }
    }

    /// Config file path for a context
    pub fn config_path(&self, context: DeploymentContext) -> PathBuf {
        self.config_dir
            .join(format!("{}_{}_config.toml", self.app_name, context))
    }

    /// Resolve, load, apply env overrides and validate
    pub fn load(&self, context_path: &str) -> Result<PipelineConfig, Error> {
        let context = self.resolve_context(context_path)?;
        let path = self.config_path(context);
        tracing::info!(%context, path = %path.display(), "Loading pipeline configuration");
        PipelineConfig::from_file_with_env(&path)
    }
}
