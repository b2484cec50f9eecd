//! Error types for the attribute manager
//!
//! Expected job outcomes (unknown plugin, malformed id, user missing in the
//! source application) are [`UpdateOutcome`](crate::UpdateOutcome) values, not
//! errors. [`AmError`] is reserved for faults the queue should see.

use am_store::StoreError;
use std::path::PathBuf;

/// Main attribute manager error type
#[derive(Debug, thiserror::Error)]
pub enum AmError {
    /// Canonical or source store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Fetcher failed for a reason other than a missing user
    #[error("fetcher for {app} failed: {message}")]
    Fetch {
        /// Application name
        app: String,
        /// Failure description
        message: String,
    },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("cannot read configuration {path}: {source}")]
    ConfigIo {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`AmConfig`](crate::AmConfig)
    #[error("cannot parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Logging could not be initialised
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl AmError {
    /// Check if a redelivery of the job may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::Fetch { .. } => true,
            Self::Config(_) | Self::ConfigIo { .. } | Self::ConfigParse(_) | Self::Telemetry(_) => {
                false
            }
        }
    }

    /// Check for a uniqueness violation in the canonical store
    #[inline]
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_ambiguous())
    }
}
