//! Logging setup

use crate::config::LogConfig;
use crate::error::AmError;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG`, when set, replaces the configured filter. Calling this again
/// after a subscriber is installed is a no-op.
///
/// # Errors
/// `AmError::Telemetry` if the configured filter does not parse
pub fn init(config: &LogConfig) -> Result<(), AmError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            AmError::Telemetry(format!("invalid log filter {:?}: {e}", config.filter))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.compact().try_init().is_ok()
    };

    if installed {
        tracing::debug!(json = config.json, "logging initialised");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        let config = LogConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_filter() {
        // Only meaningful when RUST_LOG does not take precedence
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig {
            filter: "am_core=loudest".into(),
            json: false,
        };
        assert!(matches!(init(&config), Err(AmError::Telemetry(_))));
    }
}
