//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::dispatch::dedup::DedupStrategy;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/jobmill";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default directory scanned for input datasets.
pub const DEFAULT_INPUT_DIR: &str = "./data";

/// Default extension of input dataset files.
pub const DEFAULT_INPUT_EXTENSION: &str = "nwb";

/// Default root under which worker shard directories are written.
pub const DEFAULT_OUTPUT_DIR: &str = "./results";

/// Default number of downstream workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Default number of hashes per membership query.
pub const DEFAULT_DEDUP_BATCH_SIZE: usize = 10_000;

/// Default number of records per store page.
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Default attempts per page or batch before a transient error is fatal.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;

/// Default delay before the first retry, doubled on each further attempt.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub dispatch: DispatchConfig,
    pub retry: RetryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Job generation and fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub input_dir: PathBuf,
    pub input_extension: String,
    /// JSON array of analysis specs
    pub catalog_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub workers: usize,
    pub dedup_strategy: DedupStrategy,
    pub dedup_batch_size: usize,
    pub page_size: usize,
    pub retry_failed: bool,
    pub retry_running: bool,
}

/// Retry policy for transient store errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let dedup_strategy = match std::env::var("JOBMILL_DEDUP_STRATEGY") {
            Ok(value) => value
                .parse()
                .map_err(|e: String| anyhow::anyhow!("JOBMILL_DEDUP_STRATEGY: {e}"))?,
            Err(_) => DedupStrategy::default(),
        };

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            dispatch: DispatchConfig {
                input_dir: std::env::var("JOBMILL_INPUT_DIR")
                    .unwrap_or_else(|_| DEFAULT_INPUT_DIR.to_string())
                    .into(),
                input_extension: std::env::var("JOBMILL_INPUT_EXTENSION")
                    .unwrap_or_else(|_| DEFAULT_INPUT_EXTENSION.to_string()),
                catalog_path: std::env::var("JOBMILL_CATALOG").ok().map(PathBuf::from),
                output_dir: std::env::var("JOBMILL_OUTPUT_DIR")
                    .unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string())
                    .into(),
                workers: env_parse("JOBMILL_WORKERS").unwrap_or(DEFAULT_WORKERS),
                dedup_strategy,
                dedup_batch_size: env_parse("JOBMILL_DEDUP_BATCH_SIZE")
                    .unwrap_or(DEFAULT_DEDUP_BATCH_SIZE),
                page_size: env_parse("JOBMILL_PAGE_SIZE").unwrap_or(DEFAULT_PAGE_SIZE),
                retry_failed: env_parse("JOBMILL_RETRY_FAILED").unwrap_or(false),
                retry_running: env_parse("JOBMILL_RETRY_RUNNING").unwrap_or(false),
            },
            retry: RetryConfig {
                max_attempts: env_parse("JOBMILL_RETRY_ATTEMPTS").unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                base_delay_ms: env_parse("JOBMILL_RETRY_BASE_DELAY_MS")
                    .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.dispatch.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.dispatch.dedup_batch_size == 0 {
            anyhow::bail!("Dedup batch size must be greater than 0");
        }

        if self.dispatch.page_size == 0 {
            anyhow::bail!("Page size must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("Retry attempts must be at least 1");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            dispatch: DispatchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            input_extension: DEFAULT_INPUT_EXTENSION.to_string(),
            catalog_path: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            workers: DEFAULT_WORKERS,
            dedup_strategy: DedupStrategy::default(),
            dedup_batch_size: DEFAULT_DEDUP_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            retry_failed: false,
            retry_running: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.dedup_batch_size, 10_000);
        assert_eq!(config.dispatch.input_extension, "nwb");
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = Config::default();
        config.dispatch.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_pool_bounds() {
        let mut config = Config::default();
        config.database.min_connections = 10;
        config.database.max_connections = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut config = Config::default();
        config.dispatch.page_size = 0;
        assert!(config.validate().is_err());
    }
}
