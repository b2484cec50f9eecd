//! AM Plugins - attribute fetchers and their registry
//!
//! Each source application contributes a [`Fetcher`] registered under the
//! application's name. The [`PluginRegistry`] is loaded once at startup from
//! [`PluginSpec`]s and shared read-only across jobs.
//!
//! # Example
//!
//! ```rust,ignore
//! use am_plugins::{PluginRegistry, PluginSpec, ProjectionConfig, ProjectionFetcher};
//! use std::sync::Arc;
//!
//! let fetcher = ProjectionFetcher::from_config(
//!     "eduid_signup",
//!     ProjectionConfig::default().with_field("mail", "email"),
//! )?;
//! let registry = PluginRegistry::load([PluginSpec::ready("eduid_signup", Arc::new(fetcher))]);
//! assert!(registry.contains("eduid_signup"));
//! ```

#![warn(unreachable_pub)]

mod error;
mod fetcher;
mod projection;
mod registry;

pub use error::PluginError;
pub use fetcher::{FetchError, Fetcher};
pub use projection::{PluginConfig, ProjectionConfig, ProjectionFetcher, ProjectionMode};
pub use registry::{PluginRegistry, PluginSpec};
