//! Registry errors

use thiserror::Error;

/// Plugin registration and lookup errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// No fetcher registered under this name
    #[error("plugin for {0} is not installed")]
    NotFound(String),

    /// A fetcher was already registered under this name
    #[error("duplicate plugin registration: {0}")]
    Duplicate(String),

    /// Empty application name
    #[error("plugin name must not be empty")]
    InvalidName,

    /// Configured plugin declaration is unusable
    #[error("invalid configuration for plugin {name}: {reason}")]
    InvalidConfig {
        /// Plugin name
        name: String,
        /// What is wrong
        reason: String,
    },

    /// Factory failed to construct the fetcher
    #[error("failed to register plugin {name}: {reason}")]
    Registration {
        /// Plugin name
        name: String,
        /// Underlying failure
        reason: String,
    },
}

impl PluginError {
    /// Plugin name the error refers to, if any
    #[must_use]
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::NotFound(name) | Self::Duplicate(name) => Some(name),
            Self::InvalidConfig { name, .. } | Self::Registration { name, .. } => Some(name),
            Self::InvalidName => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_name() {
        assert_eq!(PluginError::NotFound("app1".into()).plugin_name(), Some("app1"));
        assert_eq!(PluginError::InvalidName.plugin_name(), None);
    }

    #[test]
    fn test_display() {
        let err = PluginError::InvalidConfig {
            name: "app1".into(),
            reason: "no fields".into(),
        };
        assert_eq!(err.to_string(), "invalid configuration for plugin app1: no fields");
    }
}
