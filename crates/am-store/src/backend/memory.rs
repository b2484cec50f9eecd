//! In-memory document backend for tests and local dry runs.
//!
//! Semantics:
//! - every collection lives behind one process-wide `RwLock`, so each write is
//!   atomic and writes to one document are serialised
//! - documents keep insertion order; `find` returns a snapshot copy
//! - unique indexes are enforced on every write; non-unique indexes are only
//!   recorded
//! - index keys fan out over arrays, so every element of `mobile.mobile` is a
//!   key of its own
//! - a string `_id` that parses as a [`UserId`] is stored in its lowercase form

use super::{Backend, FindOptions, IndexModel, Namespace, UpdateResult};
use crate::document::{collect_path, Document, ID_FIELD};
use crate::error::StoreError;
use crate::filter::Filter;
use crate::id::UserId;
use crate::modifier::{apply_all, Modifier};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
struct MemCollection {
    docs: Vec<Document>,
    indexes: Vec<IndexModel>,
}

impl MemCollection {
    fn position(&self, filter: &Filter) -> Option<usize> {
        self.docs.iter().position(|d| filter.matches(d))
    }

    fn position_of_id(&self, id: &Value) -> Option<usize> {
        self.docs.iter().position(|d| d.get(ID_FIELD) == Some(id))
    }

    /// Check `candidate` against unique indexes, ignoring the slot at `skip`
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> Result<(), StoreError> {
        if let Some(id) = candidate.get(ID_FIELD) {
            if let Some(pos) = self.position_of_id(id) {
                if Some(pos) != skip {
                    return Err(StoreError::DuplicateKey {
                        index: ID_INDEX.to_string(),
                        key: id.to_string(),
                    });
                }
            }
        }

        for index in self.indexes.iter().filter(|i| i.unique) {
            let keys = index_keys(index, candidate);
            let clash = self
                .docs
                .iter()
                .enumerate()
                .filter(|(pos, _)| Some(*pos) != skip)
                .find_map(|(_, doc)| shared_key(&keys, &index_keys(index, doc)));
            if let Some(key) = clash {
                return Err(StoreError::DuplicateKey {
                    index: index.name.clone(),
                    key: Value::Array(key).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Every key tuple `doc` contributes to `index`
///
/// Each path may yield several values (array fan-out, leaf arrays); the keys
/// are their cartesian product. A path with no value contributes `null`.
fn index_keys(index: &IndexModel, doc: &Document) -> Vec<Vec<Value>> {
    let mut keys: Vec<Vec<Value>> = vec![Vec::new()];
    for path in index.key_paths() {
        let mut values: Vec<Value> = Vec::new();
        for value in collect_path(doc, path) {
            match value {
                Value::Array(items) => values.extend(items.iter().cloned()),
                other => values.push(other.clone()),
            }
        }
        if values.is_empty() {
            values.push(Value::Null);
        }
        values.dedup();

        keys = keys
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut key = prefix.clone();
                    key.push(value.clone());
                    key
                })
            })
            .collect();
    }
    keys
}

fn shared_key(a: &[Vec<Value>], b: &[Vec<Value>]) -> Option<Vec<Value>> {
    a.iter().find(|key| b.contains(key)).cloned()
}

/// Store a parseable string `_id` in the form [`UserId`] renders
fn normalize_id(doc: &mut Document) {
    let Some(Value::String(text)) = doc.get(ID_FIELD) else {
        return;
    };
    if let Ok(id) = text.parse::<UserId>() {
        if id.to_hex() != *text {
            doc.insert(ID_FIELD.to_string(), id.into());
        }
    }
}

/// Shared in-memory document store
///
/// Clones share the same data, so a clone handed to a [`Client`](crate::Client)
/// can still be inspected by the test that created it.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    collections: Arc<RwLock<BTreeMap<Namespace, MemCollection>>>,
}

impl MemoryBackend {
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every document in a collection
    #[must_use]
    pub fn snapshot(&self, ns: &Namespace) -> Vec<Document> {
        self.collections
            .read()
            .get(ns)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    /// Namespaces that currently exist
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.collections.read().keys().cloned().collect()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn find(
        &self,
        ns: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        filter.validate()?;
        let collections = self.collections.read();
        let Some(coll) = collections.get(ns) else {
            return Ok(Vec::new());
        };

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(coll
            .docs
            .iter()
            .filter(|d| filter.matches(d))
            .take(limit)
            .map(|d| match &options.projection {
                Some(projection) => projection.apply(d),
                None => d.clone(),
            })
            .collect())
    }

    async fn count(&self, ns: &Namespace, filter: &Filter) -> Result<u64, StoreError> {
        filter.validate()?;
        let collections = self.collections.read();
        Ok(collections.get(ns).map_or(0, |coll| {
            coll.docs.iter().filter(|d| filter.matches(d)).count() as u64
        }))
    }

    async fn insert_one(&self, ns: &Namespace, mut doc: Document) -> Result<(), StoreError> {
        doc.entry(ID_FIELD.to_string())
            .or_insert_with(|| UserId::new().into());
        normalize_id(&mut doc);

        let mut collections = self.collections.write();
        let coll = collections.entry(ns.clone()).or_default();
        coll.check_unique(&doc, None)?;
        tracing::debug!(%ns, id = ?doc.get(ID_FIELD), "inserted document");
        coll.docs.push(doc);
        Ok(())
    }

    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: &Filter,
        mut replacement: Document,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        filter.validate()?;
        normalize_id(&mut replacement);
        let mut collections = self.collections.write();

        if let Some(coll) = collections.get_mut(ns) {
            if let Some(pos) = coll.position(filter) {
                let existing_id = coll.docs[pos].get(ID_FIELD).cloned();
                match (replacement.get(ID_FIELD), &existing_id) {
                    (Some(new_id), Some(old_id)) if new_id != old_id => {
                        return Err(StoreError::ImmutableField(ID_FIELD.to_string()));
                    }
                    _ => {}
                }
                if let Some(id) = existing_id {
                    replacement.insert(ID_FIELD.to_string(), id);
                }
                coll.check_unique(&replacement, Some(pos))?;

                let modified = u64::from(coll.docs[pos] != replacement);
                tracing::debug!(%ns, modified, "replaced document");
                coll.docs[pos] = replacement;
                return Ok(UpdateResult {
                    matched: 1,
                    modified,
                    upserted: false,
                });
            }
        }

        if !upsert {
            return Ok(UpdateResult::default());
        }

        if !replacement.contains_key(ID_FIELD) {
            let id = filter
                .pinned(ID_FIELD)
                .cloned()
                .unwrap_or_else(|| UserId::new().into());
            replacement.insert(ID_FIELD.to_string(), id);
        }
        let coll = collections.entry(ns.clone()).or_default();
        coll.check_unique(&replacement, None)?;
        tracing::debug!(%ns, id = ?replacement.get(ID_FIELD), "upserted document");
        coll.docs.push(replacement);
        Ok(UpdateResult {
            matched: 0,
            modified: 0,
            upserted: true,
        })
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: &Filter,
        modifiers: &[Modifier],
    ) -> Result<UpdateResult, StoreError> {
        filter.validate()?;
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(ns) else {
            return Ok(UpdateResult::default());
        };
        let Some(pos) = coll.position(filter) else {
            return Ok(UpdateResult::default());
        };

        let mut updated = coll.docs[pos].clone();
        apply_all(&mut updated, modifiers)?;
        coll.check_unique(&updated, Some(pos))?;

        let modified = u64::from(coll.docs[pos] != updated);
        tracing::debug!(%ns, modifiers = modifiers.len(), modified, "updated document");
        coll.docs[pos] = updated;
        Ok(UpdateResult {
            matched: 1,
            modified,
            upserted: false,
        })
    }

    async fn create_index(&self, ns: &Namespace, index: &IndexModel) -> Result<bool, StoreError> {
        let mut collections = self.collections.write();
        let coll = collections.entry(ns.clone()).or_default();

        if let Some(existing) = coll.indexes.iter().find(|i| i.name == index.name) {
            if existing == index {
                return Ok(false);
            }
            return Err(StoreError::IndexConflict {
                name: index.name.clone(),
            });
        }

        if index.unique {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            for doc in &coll.docs {
                let mut keys = index_keys(index, doc);
                if let Some(key) = shared_key(&keys, &seen) {
                    return Err(StoreError::DuplicateKey {
                        index: index.name.clone(),
                        key: Value::Array(key).to_string(),
                    });
                }
                seen.append(&mut keys);
            }
        }

        tracing::debug!(%ns, index = %index.name, unique = index.unique, "created index");
        coll.indexes.push(index.clone());
        Ok(true)
    }

    async fn list_indexes(&self, ns: &Namespace) -> Result<Vec<IndexModel>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(ns)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn drop_collection(&self, ns: &Namespace) -> Result<(), StoreError> {
        self.collections.write().remove(ns);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn ns() -> Namespace {
        Namespace::new("am", "attributes")
    }

    #[tokio::test]
    async fn insert_generates_missing_id() {
        let backend = MemoryBackend::new();
        backend
            .insert_one(&ns(), doc(json!({"email": "a@example.com"})))
            .await
            .unwrap();

        let docs = backend.snapshot(&ns());
        assert_eq!(docs.len(), 1);
        let id = docs[0].get(ID_FIELD).and_then(Value::as_str).unwrap();
        assert!(id.parse::<UserId>().is_ok());
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let backend = MemoryBackend::new();
        let d = doc(json!({"_id": "x"}));
        backend.insert_one(&ns(), d.clone()).await.unwrap();
        let err = backend.insert_one(&ns(), d).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { index, .. } if index == ID_INDEX));
    }

    #[tokio::test]
    async fn find_applies_limit_and_projection() {
        let backend = MemoryBackend::new();
        for i in 0..3 {
            backend
                .insert_one(&ns(), doc(json!({"_id": i, "kind": "user", "n": i})))
                .await
                .unwrap();
        }

        let options = FindOptions::default()
            .with_limit(2)
            .with_projection(crate::Projection::include(["kind"]));
        let found = backend
            .find(&ns(), &Filter::eq("kind", "user"), &options)
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![
                doc(json!({"_id": 0, "kind": "user"})),
                doc(json!({"_id": 1, "kind": "user"}))
            ]
        );
    }

    #[tokio::test]
    async fn replace_upserts_with_pinned_id() {
        let backend = MemoryBackend::new();
        let result = backend
            .replace_one(&ns(), &Filter::eq("_id", "u1"), doc(json!({"a": 1})), true)
            .await
            .unwrap();
        assert!(result.upserted);
        assert_eq!(backend.snapshot(&ns()), vec![doc(json!({"_id": "u1", "a": 1}))]);
    }

    #[tokio::test]
    async fn replace_without_upsert_is_noop_on_miss() {
        let backend = MemoryBackend::new();
        let result = backend
            .replace_one(&ns(), &Filter::eq("_id", "u1"), doc(json!({"a": 1})), false)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::default());
        assert!(backend.snapshot(&ns()).is_empty());
    }

    #[tokio::test]
    async fn replace_cannot_change_id() {
        let backend = MemoryBackend::new();
        backend.insert_one(&ns(), doc(json!({"_id": "u1"}))).await.unwrap();
        let err = backend
            .replace_one(&ns(), &Filter::eq("_id", "u1"), doc(json!({"_id": "u2"})), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ImmutableField(_)));
    }

    #[tokio::test]
    async fn update_reports_modified_only_on_change() {
        let backend = MemoryBackend::new();
        backend
            .insert_one(&ns(), doc(json!({"_id": "u1", "email": "a@example.com"})))
            .await
            .unwrap();

        let filter = Filter::eq("_id", "u1");
        let same = backend
            .update_one(&ns(), &filter, &[Modifier::set("email", "a@example.com")])
            .await
            .unwrap();
        assert_eq!((same.matched, same.modified), (1, 0));

        let changed = backend
            .update_one(&ns(), &filter, &[Modifier::set("email", "b@example.com")])
            .await
            .unwrap();
        assert_eq!((changed.matched, changed.modified), (1, 1));
    }

    #[tokio::test]
    async fn unique_index_blocks_duplicates() {
        let backend = MemoryBackend::new();
        let index = IndexModel::new("eppn-index", ["eppn"]).unique();
        assert!(backend.create_index(&ns(), &index).await.unwrap());

        backend
            .insert_one(&ns(), doc(json!({"_id": "u1", "eppn": "a@eduid.se"})))
            .await
            .unwrap();
        let err = backend
            .insert_one(&ns(), doc(json!({"_id": "u2", "eppn": "a@eduid.se"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { index, .. } if index == "eppn-index"));
    }

    #[tokio::test]
    async fn unique_index_covers_every_array_element() {
        let backend = MemoryBackend::new();
        let index = IndexModel::new("mobile-index", ["mobile.mobile"]).unique();
        backend.create_index(&ns(), &index).await.unwrap();

        backend
            .insert_one(
                &ns(),
                doc(json!({"_id": "u1", "mobile": [{"mobile": "+461"}, {"mobile": "+462"}]})),
            )
            .await
            .unwrap();
        let err = backend
            .insert_one(&ns(), doc(json!({"_id": "u2", "mobile": [{"mobile": "+462"}]})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { index, .. } if index == "mobile-index"));

        backend
            .insert_one(&ns(), doc(json!({"_id": "u3", "mobile": [{"mobile": "+463"}]})))
            .await
            .unwrap();
        assert_eq!(
            backend
                .count(&ns(), &Filter::eq("mobile.mobile", "+462"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn unique_index_allows_repeats_within_one_document() {
        let backend = MemoryBackend::new();
        let index = IndexModel::new("tags-index", ["tags"]).unique();
        backend.create_index(&ns(), &index).await.unwrap();

        backend
            .insert_one(&ns(), doc(json!({"_id": "u1", "tags": ["a", "a", "b"]})))
            .await
            .unwrap();
        backend
            .update_one(&ns(), &Filter::eq("_id", "u1"), &[Modifier::push("tags", "c")])
            .await
            .unwrap();
        let err = backend
            .insert_one(&ns(), doc(json!({"_id": "u2", "tags": ["c"]})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn create_unique_index_rejects_existing_array_overlap() {
        let backend = MemoryBackend::new();
        backend
            .insert_one(
                &ns(),
                doc(json!({"_id": "u1", "mobile": [{"mobile": "+461"}, {"mobile": "+462"}]})),
            )
            .await
            .unwrap();
        backend
            .insert_one(&ns(), doc(json!({"_id": "u2", "mobile": [{"mobile": "+462"}]})))
            .await
            .unwrap();

        let index = IndexModel::new("mobile-index", ["mobile.mobile"]).unique();
        let err = backend.create_index(&ns(), &index).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert!(backend.list_indexes(&ns()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uppercase_user_id_is_stored_lowercase() {
        let backend = MemoryBackend::new();
        backend
            .insert_one(&ns(), doc(json!({"_id": "5F3E2B1A9C8D7E6F5A4B3C2D"})))
            .await
            .unwrap();
        backend
            .insert_one(&ns(), doc(json!({"_id": "not-an-object-id"})))
            .await
            .unwrap();

        assert_eq!(
            backend.snapshot(&ns()),
            vec![
                doc(json!({"_id": "5f3e2b1a9c8d7e6f5a4b3c2d"})),
                doc(json!({"_id": "not-an-object-id"}))
            ]
        );
    }

    #[tokio::test]
    async fn create_index_is_idempotent_and_detects_conflicts() {
        let backend = MemoryBackend::new();
        let index = IndexModel::new("email-index", ["email"]);
        assert!(backend.create_index(&ns(), &index).await.unwrap());
        assert!(!backend.create_index(&ns(), &index).await.unwrap());

        let other = IndexModel::new("email-index", ["mail"]);
        let err = backend.create_index(&ns(), &other).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { .. }));
        assert_eq!(backend.list_indexes(&ns()).await.unwrap(), vec![index]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        clone.insert_one(&ns(), doc(json!({"_id": 1}))).await.unwrap();
        assert_eq!(backend.count(&ns(), &Filter::new()).await.unwrap(), 1);

        backend.drop_collection(&ns()).await.unwrap();
        assert!(clone.namespaces().is_empty());
    }
}
