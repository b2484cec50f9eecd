//! Attribute manager configuration
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! ```toml
//! [store]
//! uri = "memory://"
//! database = "eduid_am"
//!
//! [worker]
//! max_concurrent_jobs = 8
//!
//! [log]
//! filter = "info,am_core=debug"
//! json = false
//!
//! [[plugins]]
//! name = "eduid_signup"
//! fields = { "mail" = "email" }
//! ```

use crate::error::AmError;
use am_plugins::PluginConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Overrides `store.uri`
pub const ENV_STORE_URI: &str = "AM_STORE_URI";

/// Overrides `store.database`
pub const ENV_STORE_DATABASE: &str = "AM_STORE_DATABASE";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmConfig {
    /// Store connection
    pub store: StoreConfig,
    /// Job execution
    pub worker: WorkerConfig,
    /// Logging
    pub log: LogConfig,
    /// Config-declared fetchers
    pub plugins: Vec<PluginConfig>,
}

/// Store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// URI-style connection string
    pub uri: String,
    /// Database holding the canonical collection
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: String::from("memory://"),
            database: String::from("eduid_am"),
        }
    }
}

/// Job execution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Jobs processed at once
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    pub filter: String,
    /// Emit JSON lines instead of compact text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: String::from("info"),
            json: false,
        }
    }
}

impl AmConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With store URI
    #[must_use]
    pub fn with_store_uri(mut self, uri: impl Into<String>) -> Self {
        self.store.uri = uri.into();
        self
    }

    /// With canonical database name
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.store.database = database.into();
        self
    }

    /// With job concurrency
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.worker.max_concurrent_jobs = max;
        self
    }

    /// With an additional config-declared fetcher
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginConfig) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `AmError::ConfigParse` for malformed or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self, AmError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `AmError::ConfigIo` or `AmError::ConfigParse`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AmError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AmError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// File, then process environment, then validation
    ///
    /// # Errors
    /// Any load or validation error
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AmError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, typically the process environment
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_STORE_URI) {
            tracing::debug!(var = ENV_STORE_URI, "store uri overridden from environment");
            self.store.uri = uri;
        }
        if let Some(database) = lookup(ENV_STORE_DATABASE) {
            tracing::debug!(
                var = ENV_STORE_DATABASE,
                %database,
                "database overridden from environment"
            );
            self.store.database = database;
        }
    }

    /// Check value constraints
    ///
    /// # Errors
    /// `AmError::Config` describing the first invalid value
    pub fn validate(&self) -> Result<(), AmError> {
        if self.store.uri.trim().is_empty() {
            return Err(AmError::Config("store.uri must not be empty".into()));
        }
        if self.store.database.trim().is_empty() {
            return Err(AmError::Config("store.database must not be empty".into()));
        }
        if self.worker.max_concurrent_jobs == 0 {
            return Err(AmError::Config(
                "worker.max_concurrent_jobs must be at least 1".into(),
            ));
        }
        if let Some(plugin) = self.plugins.iter().find(|p| p.name.trim().is_empty()) {
            return Err(AmError::Config(format!(
                "plugin entry with empty name (collection {})",
                plugin.projection.collection
            )));
        }
        Ok(())
    }
}
