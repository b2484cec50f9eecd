//! Config-driven projection fetcher
//!
//! Copies selected fields of the user's document in a source application
//! collection into the canonical record. Declared in configuration:
//!
//! ```toml
//! [[plugins]]
//! name = "eduid_signup"
//! collection = "registered"
//! mode = "set"
//! fields = { "mail" = "email", "eppn" = "eduPersonPrincipalName" }
//! ```

use crate::error::PluginError;
use crate::fetcher::{FetchError, Fetcher};
use crate::registry::PluginSpec;
use am_store::document::{get_path, set_path};
use am_store::{Database, Document, Filter, MergeOp, Modifier, UserId, ID_FIELD};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How fetched fields are merged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Field-level `$set` on the existing record
    #[default]
    Set,
    /// Replace the whole record with the projected fields
    Replace,
}

/// Projection fetcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Source collection
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Source field holding the user id
    #[serde(default = "default_match_field")]
    pub match_field: String,

    /// Source path to canonical path
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Merge mode
    #[serde(default)]
    pub mode: ProjectionMode,

    /// In `set` mode, unset canonical fields whose source field is absent
    #[serde(default)]
    pub unset_missing: bool,
}

fn default_collection() -> String {
    String::from("user")
}

fn default_match_field() -> String {
    String::from(ID_FIELD)
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            match_field: default_match_field(),
            fields: BTreeMap::new(),
            mode: ProjectionMode::default(),
            unset_missing: false,
        }
    }
}

impl ProjectionConfig {
    /// Map `source` to `target`
    #[must_use]
    pub fn with_field(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.insert(source.into(), target.into());
        self
    }

    /// Set merge mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ProjectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set source collection
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    fn validate(&self, name: &str) -> Result<(), PluginError> {
        let invalid = |reason: &str| PluginError::InvalidConfig {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if self.collection.trim().is_empty() {
            return Err(invalid("collection must not be empty"));
        }
        if self.match_field.trim().is_empty() {
            return Err(invalid("match_field must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(invalid("at least one field mapping is required"));
        }
        if self
            .fields
            .values()
            .any(|t| t.is_empty() || t == ID_FIELD || t.starts_with("_id."))
        {
            return Err(invalid("target fields must be non-empty and must not be _id"));
        }
        Ok(())
    }
}

/// A `[[plugins]]` configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Application name
    pub name: String,

    /// Projection settings
    #[serde(flatten)]
    pub projection: ProjectionConfig,
}

impl PluginConfig {
    /// Registry spec building a [`ProjectionFetcher`]
    #[must_use]
    pub fn into_spec(self) -> PluginSpec {
        let Self { name, projection } = self;
        let fetcher_name = name.clone();
        PluginSpec::new(name, move || {
            let fetcher = ProjectionFetcher::from_config(&fetcher_name, projection)?;
            Ok(Arc::new(fetcher) as Arc<dyn Fetcher>)
        })
    }
}

/// Fetcher copying configured fields from a source collection
#[derive(Debug, Clone)]
pub struct ProjectionFetcher {
    config: ProjectionConfig,
}

impl ProjectionFetcher {
    /// Build from validated settings
    ///
    /// # Errors
    /// `PluginError::InvalidConfig` for an unusable declaration
    pub fn from_config(name: &str, config: ProjectionConfig) -> Result<Self, PluginError> {
        config.validate(name)?;
        Ok(Self { config })
    }

    fn project(&self, source: &Document) -> Result<MergeOp, FetchError> {
        match self.config.mode {
            ProjectionMode::Set => {
                let modifiers = self
                    .config
                    .fields
                    .iter()
                    .filter_map(|(src, target)| match get_path(source, src) {
                        Some(value) => Some(Modifier::set(target.as_str(), value.clone())),
                        None if self.config.unset_missing => Some(Modifier::unset(target.as_str())),
                        None => None,
                    })
                    .collect::<Vec<_>>();
                Ok(MergeOp::Partial(modifiers))
            }
            ProjectionMode::Replace => {
                let mut doc = Document::new();
                for (src, target) in &self.config.fields {
                    if let Some(value) = get_path(source, src) {
                        set_path(&mut doc, target, value.clone())?;
                    }
                }
                Ok(MergeOp::Replace(doc))
            }
        }
    }
}

#[async_trait]
impl Fetcher for ProjectionFetcher {
    async fn fetch(&self, source: &Database, user_id: &UserId) -> Result<MergeOp, FetchError> {
        let filter = Filter::eq(self.config.match_field.as_str(), *user_id);
        let doc = source
            .collection(&self.config.collection)
            .find_one(&filter)
            .await?
            .ok_or_else(|| FetchError::user_not_found(user_id))?;

        tracing::trace!(db = source.name(), user = %user_id, "projecting source document");
        self.project(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_store::Client;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> ProjectionConfig {
        ProjectionConfig::default()
            .with_field("mail", "email")
            .with_field("profile.given_name", "givenName")
    }

    async fn source_with(user: &UserId, record: serde_json::Value) -> Database {
        let client = Client::connect("memory://").unwrap();
        let db = client.database("app1");
        let mut doc = record.as_object().cloned().unwrap();
        doc.insert(ID_FIELD.into(), (*user).into());
        db.collection("user").insert_one(doc).await.unwrap();
        db
    }

    #[test]
    fn test_config_validation() {
        assert!(ProjectionFetcher::from_config("app1", config()).is_ok());
        assert!(matches!(
            ProjectionFetcher::from_config("app1", ProjectionConfig::default()),
            Err(PluginError::InvalidConfig { .. })
        ));
        assert!(ProjectionFetcher::from_config("app1", config().with_field("x", "_id")).is_err());
        assert!(ProjectionFetcher::from_config("app1", config().with_collection(" ")).is_err());
    }

    #[test]
    fn test_plugin_config_from_toml_shape() {
        let entry: PluginConfig = serde_json::from_value(json!({
            "name": "app1",
            "fields": {"mail": "email"},
            "mode": "replace"
        }))
        .unwrap();
        assert_eq!(entry.projection.collection, "user");
        assert_eq!(entry.projection.mode, ProjectionMode::Replace);
    }

    #[tokio::test]
    async fn test_set_mode_projects_present_fields() {
        let user = UserId::new();
        let db = source_with(&user, json!({"mail": "a@example.com", "other": 1})).await;
        let fetcher = ProjectionFetcher::from_config("app1", config()).unwrap();

        let op = fetcher.fetch(&db, &user).await.unwrap();
        assert_eq!(op, MergeOp::partial([Modifier::set("email", "a@example.com")]));
    }

    #[tokio::test]
    async fn test_set_mode_can_unset_missing() {
        let user = UserId::new();
        let db = source_with(&user, json!({"mail": "a@example.com"})).await;
        let mut cfg = config();
        cfg.unset_missing = true;
        let fetcher = ProjectionFetcher::from_config("app1", cfg).unwrap();

        let op = fetcher.fetch(&db, &user).await.unwrap();
        assert_eq!(
            op,
            MergeOp::partial([
                Modifier::set("email", "a@example.com"),
                Modifier::unset("givenName"),
            ])
        );
    }

    #[tokio::test]
    async fn test_replace_mode_builds_document() {
        let user = UserId::new();
        let db = source_with(
            &user,
            json!({"mail": "a@example.com", "profile": {"given_name": "Ada"}}),
        )
        .await;
        let fetcher =
            ProjectionFetcher::from_config("app1", config().with_mode(ProjectionMode::Replace))
                .unwrap();

        let op = fetcher.fetch(&db, &user).await.unwrap();
        let expected = json!({"email": "a@example.com", "givenName": "Ada"});
        assert_eq!(op, MergeOp::Replace(expected.as_object().cloned().unwrap()));
    }

    #[tokio::test]
    async fn test_missing_source_user() {
        let db = source_with(&UserId::new(), json!({"mail": "x"})).await;
        let fetcher = ProjectionFetcher::from_config("app1", config()).unwrap();

        let err = fetcher.fetch(&db, &UserId::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::UserNotFound { .. }));
    }
}
