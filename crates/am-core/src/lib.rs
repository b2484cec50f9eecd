//! AM Core - attribute manager orchestration
//!
//! The core that:
//! - Loads configuration and plugins
//! - Runs update jobs: fetch from a source application, merge into the canonical record
//! - Classifies expected dead ends as outcomes and faults as errors
//! - Dispatches jobs with bounded concurrency
//!
//! # Example
//!
//! ```rust,ignore
//! use am_core::{AmConfig, AttributeManager, UpdateJob};
//!
//! # async fn example() -> Result<(), am_core::AmError> {
//! let config = AmConfig::load("am.toml")?;
//! let manager = AttributeManager::from_config(&config, Vec::new())?;
//!
//! let job = UpdateJob::new("eduid_signup", "5f1e0a6b2c3d4e5f60718293");
//! let outcome = manager.update_attributes(&job).await?;
//! println!("job finished: {outcome}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod manager;
pub mod telemetry;

pub use config::{AmConfig, LogConfig, StoreConfig, WorkerConfig, ENV_STORE_DATABASE, ENV_STORE_URI};
pub use dispatch::{DispatchStats, JobDispatcher};
pub use error::AmError;
pub use job::{JobId, UpdateJob, UpdateOutcome};
pub use manager::AttributeManager;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running update jobs
    pub use crate::{AmConfig, AmError, AttributeManager, JobDispatcher, UpdateJob, UpdateOutcome};
    pub use am_plugins::{FetchError, Fetcher, PluginRegistry, PluginSpec};
    pub use am_store::{Client, Database, MergeOp, Modifier, UserId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
