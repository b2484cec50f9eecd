//! Update orchestrator
//!
//! [`AttributeManager::update_attributes`] runs one job: resolve the fetcher,
//! parse the identifier, fetch from the application's database and merge into
//! the canonical record. Expected dead ends end the job with an
//! [`UpdateOutcome`]; faults are returned for the queue to retry.

use crate::config::AmConfig;
use crate::error::AmError;
use crate::job::{UpdateJob, UpdateOutcome};
use am_plugins::{FetchError, PluginRegistry, PluginSpec};
use am_store::{AttributeStore, Client, UserId};
use std::sync::Arc;

/// Long-lived state shared by every job
#[derive(Debug, Clone)]
pub struct AttributeManager {
    client: Client,
    store: Arc<AttributeStore>,
    registry: PluginRegistry,
}

impl AttributeManager {
    /// Create manager over an existing client and registry
    #[must_use]
    pub fn new(client: Client, database: &str, registry: PluginRegistry) -> Self {
        let store = Arc::new(AttributeStore::new(&client.database(database)));
        Self {
            client,
            store,
            registry,
        }
    }

    /// Connect the store and load plugins from configuration
    ///
    /// Config-declared fetchers are registered before `extra` so that a
    /// compiled-in fetcher cannot shadow one the operator declared.
    ///
    /// # Errors
    /// Validation errors and `StoreError::UnsupportedScheme`/`InvalidUri`
    pub fn from_config(
        config: &AmConfig,
        extra: impl IntoIterator<Item = PluginSpec>,
    ) -> Result<Self, AmError> {
        config.validate()?;
        let client = Client::connect(&config.store.uri)?;
        Ok(Self::from_config_with_client(config, client, extra))
    }

    /// Like [`from_config`](Self::from_config) with an externally built client
    #[must_use]
    pub fn from_config_with_client(
        config: &AmConfig,
        client: Client,
        extra: impl IntoIterator<Item = PluginSpec>,
    ) -> Self {
        let specs = config
            .plugins
            .iter()
            .cloned()
            .map(am_plugins::PluginConfig::into_spec)
            .chain(extra);
        let registry = PluginRegistry::load(specs);
        Self::new(client, &config.store.database, registry)
    }

    /// Canonical store accessor
    #[inline]
    #[must_use]
    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    /// Loaded plugins
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Store client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run one update job
    ///
    /// # Errors
    /// - `AmError::Store` for source or canonical store faults, including
    ///   ambiguous canonical records
    /// - `AmError::Fetch` when the fetcher fails for another reason
    #[tracing::instrument(
        name = "update_attributes",
        skip(self, job),
        fields(job = %job.id(), app = %job.app_name, user = %job.user_id)
    )]
    pub async fn update_attributes(&self, job: &UpdateJob) -> Result<UpdateOutcome, AmError> {
        tracing::debug!("update started");

        let Ok(fetcher) = self.registry.lookup(&job.app_name) else {
            tracing::error!("plugin for {} is not installed", job.app_name);
            return Ok(UpdateOutcome::PluginMissing);
        };

        let user_id = match job.user_id.parse::<UserId>() {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, "invalid user id from app {}", job.app_name);
                return Ok(UpdateOutcome::InvalidIdentifier);
            }
        };

        let source = self.client.database(&job.app_name);
        let op = match fetcher.fetch(&source, &user_id).await {
            Ok(op) => op,
            Err(FetchError::UserNotFound { .. }) => {
                tracing::warn!("user does not exist in the database for plugin {}", job.app_name);
                return Ok(UpdateOutcome::SourceUserMissing);
            }
            Err(FetchError::Store(err)) => {
                tracing::error!(error = %err, "source store failure");
                return Err(err.into());
            }
            Err(FetchError::Failed(message)) => {
                tracing::error!(%message, "fetcher failed");
                return Err(AmError::Fetch {
                    app: job.app_name.clone(),
                    message,
                });
            }
        };

        tracing::debug!(?op, "attributes fetched");
        let report = match self.store.merge(&user_id, op).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "merge into canonical store failed");
                return Err(err.into());
            }
        };

        tracing::info!(
            matched = report.matched,
            modified = report.modified,
            created = report.created,
            "attributes merged"
        );
        Ok(UpdateOutcome::Applied(report))
    }
}
