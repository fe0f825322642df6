//! Configuration file support.
//!
//! `repository.toml` selects the store backend and carries the engine timeouts and the
//! directory credentials. Every section is optional; environment variables override the file.
//!
//! ```toml
//! [repository]
//! type = "postgres"
//!
//! [postgres]
//! database_url = "postgres://checkins@localhost/checkins"
//!
//! [engine]
//! store_timeout_ms = 5000
//! directory_timeout_ms = 10000
//! max_outstanding_periods = 52
//!
//! [slack]
//! token = "xoxb-..."
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::factory::RepositoryType;
use super::repository::RepositoryError;
use crate::db::PostgresConfig;

/// Configuration loaded from `repository.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub slack: SlackSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: "local".to_string(),
        }
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Engine timeouts and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound for any single store call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Upper bound for a directory membership fetch.
    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,
    /// How many completed periods `classify_all_outstanding` walks at most.
    #[serde(default = "default_max_outstanding_periods")]
    pub max_outstanding_periods: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            directory_timeout_ms: default_directory_timeout_ms(),
            max_outstanding_periods: default_max_outstanding_periods(),
        }
    }
}

/// Slack directory credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default)]
    pub token: Option<String>,
    /// Override for the Web API base URL.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_directory_timeout_ms() -> u64 {
    10_000
}

fn default_max_outstanding_periods() -> u32 {
    52
}

impl RepositoryConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `repository.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        let search_paths = [
            PathBuf::from("repository.toml"),
            PathBuf::from("backend/repository.toml"),
            PathBuf::from("../repository.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No repository.toml found in standard locations",
        ))
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    ///
    /// Unparseable numeric values are ignored and the file value is kept.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(repo_type) = lookup("REPOSITORY_TYPE") {
            self.repository.repo_type = repo_type;
        }
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("PG_DATABASE_URL")) {
            self.postgres.database_url = url;
        }
        if let Some(ms) = lookup("ENGINE_STORE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.engine.store_timeout_ms = ms;
        }
        if let Some(ms) = lookup("ENGINE_DIRECTORY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.engine.directory_timeout_ms = ms;
        }
        if let Some(n) = lookup("ENGINE_MAX_OUTSTANDING_PERIODS").and_then(|v| v.parse().ok()) {
            self.engine.max_outstanding_periods = n;
        }
        if let Some(token) = lookup("SLACK_BOT_TOKEN") {
            self.slack.token = Some(token);
        }
        self
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Convert to PostgresConfig if this is a Postgres configuration.
    #[cfg(feature = "postgres-repo")]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type != RepositoryType::Postgres {
            return Ok(None);
        }

        if self.postgres.database_url.is_empty() {
            return Err(RepositoryError::configuration(
                "Postgres repository requires 'postgres.database_url' setting",
            ));
        }

        Ok(Some(PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
            min_pool_size: self.postgres.min_connections,
            connection_timeout_sec: self.postgres.connect_timeout,
            idle_timeout_sec: self.postgres.idle_timeout,
            max_retries: self.postgres.max_retries,
            retry_delay_ms: self.postgres.retry_delay_ms,
        }))
    }

    /// Convert to PostgresConfig when the feature is disabled.
    #[cfg(not(feature = "postgres-repo"))]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type == RepositoryType::Postgres {
            return Err(RepositoryError::configuration(
                "Postgres repository feature not enabled",
            ));
        }

        Ok(None)
    }
}
