//! Plugin registry
//!
//! Provides [`PluginRegistry`], the immutable mapping from application name to
//! its [`Fetcher`]. The registry is built once at startup from a list of
//! [`PluginSpec`]s and only read afterwards.

use crate::error::PluginError;
use crate::fetcher::Fetcher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

type Factory = Box<dyn FnOnce() -> Result<Arc<dyn Fetcher>, PluginError> + Send>;

/// A named, not yet constructed fetcher
pub struct PluginSpec {
    name: String,
    factory: Factory,
}

impl PluginSpec {
    /// Spec whose fetcher is built by `factory` during [`PluginRegistry::load`]
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Fetcher>, PluginError> + Send + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(factory),
        }
    }

    /// Spec for an already constructed fetcher
    pub fn ready(name: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(name, move || Ok(fetcher))
    }

    /// Application name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Immutable application name to fetcher mapping
///
/// Cheap to clone; clones share the mapping.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<HashMap<String, Arc<dyn Fetcher>>>,
}

impl PluginRegistry {
    /// Build the registry, logging and skipping bad registrations
    #[must_use]
    pub fn load(specs: impl IntoIterator<Item = PluginSpec>) -> Self {
        Self::load_reporting(specs).0
    }

    /// Build the registry and return the rejected registrations
    ///
    /// Registration policy:
    /// - the first spec for a name claims it; later specs are rejected as duplicates
    /// - a failing factory is skipped and its name stays unresolvable
    /// - an empty name is rejected
    pub fn load_reporting(
        specs: impl IntoIterator<Item = PluginSpec>,
    ) -> (Self, Vec<PluginError>) {
        let mut plugins: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut rejected = Vec::new();

        for PluginSpec { name, factory } in specs {
            if name.trim().is_empty() {
                tracing::warn!("ignoring plugin with empty name");
                rejected.push(PluginError::InvalidName);
                continue;
            }
            if !claimed.insert(name.clone()) {
                tracing::warn!(plugin = %name, "duplicate plugin registration");
                rejected.push(PluginError::Duplicate(name));
                continue;
            }

            match factory() {
                Ok(fetcher) => {
                    tracing::debug!(plugin = %name, "registered plugin");
                    plugins.insert(name, fetcher);
                }
                Err(err) => {
                    tracing::warn!(plugin = %name, error = %err, "failed to load plugin");
                    rejected.push(err);
                }
            }
        }

        tracing::info!(count = plugins.len(), rejected = rejected.len(), "plugin registry loaded");
        (
            Self {
                plugins: Arc::new(plugins),
            },
            rejected,
        )
    }

    /// Fetcher registered for `app_name`
    ///
    /// # Errors
    /// `PluginError::NotFound` if no fetcher is registered under that name
    pub fn lookup(&self, app_name: &str) -> Result<Arc<dyn Fetcher>, PluginError> {
        self.plugins
            .get(app_name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(app_name.to_string()))
    }

    /// Check if a fetcher is registered under `app_name`
    #[inline]
    #[must_use]
    pub fn contains(&self, app_name: &str) -> bool {
        self.plugins.contains_key(app_name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered fetchers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use am_store::{Database, MergeOp, UserId};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Tagged(&'static str);

    #[async_trait]
    impl Fetcher for Tagged {
        async fn fetch(
            &self,
            _source: &Database,
            _user_id: &UserId,
        ) -> Result<MergeOp, FetchError> {
            Ok(MergeOp::Partial(Vec::new()))
        }
    }

    fn tagged(name: &'static str, tag: &'static str) -> PluginSpec {
        PluginSpec::ready(name, Arc::new(Tagged(tag)))
    }

    #[test]
    fn test_lookup_registered_and_missing() {
        let registry = PluginRegistry::load([tagged("app1", "a"), tagged("app2", "b")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["app1", "app2"]);
        assert!(registry.lookup("app1").is_ok());
        assert!(matches!(
            registry.lookup("unknown-app"),
            Err(PluginError::NotFound(name)) if name == "unknown-app"
        ));
    }

    #[test]
    fn test_first_registration_wins() {
        let (registry, rejected) =
            PluginRegistry::load_reporting([tagged("app1", "first"), tagged("app1", "second")]);
        assert_eq!(registry.len(), 1);
        assert!(matches!(&rejected[..], [PluginError::Duplicate(name)] if name == "app1"));

        let fetcher = registry.lookup("app1").unwrap();
        assert!(format!("{fetcher:?}").contains("first"));
    }

    #[test]
    fn test_failing_factory_does_not_abort_others() {
        let failing = PluginSpec::new("broken", || {
            Err(PluginError::Registration {
                name: "broken".into(),
                reason: "missing dependency".into(),
            })
        });
        let (registry, rejected) = PluginRegistry::load_reporting([
            failing,
            tagged("app1", "a"),
            tagged("broken", "late"),
        ]);

        assert!(registry.contains("app1"));
        assert!(!registry.contains("broken"));
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let (registry, rejected) = PluginRegistry::load_reporting([tagged("  ", "a")]);
        assert!(registry.is_empty());
        assert!(matches!(&rejected[..], [PluginError::InvalidName]));
    }

    #[test]
    fn test_clones_share_mapping() {
        let registry = PluginRegistry::load([tagged("app1", "a")]);
        let clone = registry.clone();
        assert!(Arc::ptr_eq(
            &registry.lookup("app1").unwrap(),
            &clone.lookup("app1").unwrap()
        ));
    }
}
