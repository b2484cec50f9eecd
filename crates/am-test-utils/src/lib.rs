//! Testing utilities for the attribute manager workspace
//!
//! Shared fixtures: stub fetchers, a backend that always fails, sample
//! records and in-memory client setup.

#![allow(missing_docs)]

use am_plugins::{FetchError, Fetcher, PluginRegistry, PluginSpec};
use am_store::backend::{Backend, FindOptions, IndexModel, Namespace, UpdateResult};
use am_store::{
    Client, Database, Document, Filter, MemoryBackend, MergeOp, Modifier, StoreError, UserId,
    ATTRIBUTES_COLLECTION, ID_FIELD,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Database name used for the canonical store in tests
pub const TEST_DATABASE: &str = "eduid_am";

/// Convert a JSON object literal into a [`Document`]
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Fetcher returning a fixed merge operation
#[derive(Debug, Clone)]
pub struct StaticFetcher(pub MergeOp);

impl StaticFetcher {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self(MergeOp::partial([Modifier::set(field, value)]))
    }

    pub fn replace(body: Value) -> Self {
        Self(MergeOp::Replace(doc(body)))
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _source: &Database, _user_id: &UserId) -> Result<MergeOp, FetchError> {
        Ok(self.0.clone())
    }
}

/// Fetcher reporting that the user is absent from its application
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingUserFetcher;

#[async_trait]
impl Fetcher for MissingUserFetcher {
    async fn fetch(&self, _source: &Database, user_id: &UserId) -> Result<MergeOp, FetchError> {
        Err(FetchError::user_not_found(user_id))
    }
}

/// Fetcher that always fails with [`FetchError::Failed`]
#[derive(Debug, Clone)]
pub struct FailingFetcher(pub String);

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, _source: &Database, _user_id: &UserId) -> Result<MergeOp, FetchError> {
        Err(FetchError::Failed(self.0.clone()))
    }
}

/// Reads `uid` from the source `user` collection and sets `eppn`
#[derive(Debug, Clone, Copy, Default)]
pub struct EppnFetcher;

#[async_trait]
impl Fetcher for EppnFetcher {
    async fn fetch(&self, source: &Database, user_id: &UserId) -> Result<MergeOp, FetchError> {
        let user = source
            .collection("user")
            .find_one(&Filter::by_id(user_id))
            .await?
            .ok_or_else(|| FetchError::user_not_found(user_id))?;

        let uid = user
            .get("uid")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::Failed(format!("user {user_id} has no uid")))?;
        Ok(MergeOp::partial([Modifier::set(
            "eppn",
            format!("{uid}@eduid.se"),
        )]))
    }
}

/// Backend whose every operation fails with a transport error
#[derive(Debug, Clone)]
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        Err(StoreError::Transport(self.message.clone()))
    }
}

impl Default for FailingBackend {
    fn default() -> Self {
        Self::new("connection refused")
    }
}

#[async_trait]
impl Backend for FailingBackend {
    async fn find(
        &self,
        _ns: &Namespace,
        _filter: &Filter,
        _options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.fail()
    }

    async fn count(&self, _ns: &Namespace, _filter: &Filter) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn insert_one(&self, _ns: &Namespace, _doc: Document) -> Result<(), StoreError> {
        self.fail()
    }

    async fn replace_one(
        &self,
        _ns: &Namespace,
        _filter: &Filter,
        _replacement: Document,
        _upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        self.fail()
    }

    async fn update_one(
        &self,
        _ns: &Namespace,
        _filter: &Filter,
        _modifiers: &[Modifier],
    ) -> Result<UpdateResult, StoreError> {
        self.fail()
    }

    async fn create_index(&self, _ns: &Namespace, _index: &IndexModel) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn list_indexes(&self, _ns: &Namespace) -> Result<Vec<IndexModel>, StoreError> {
        self.fail()
    }

    async fn drop_collection(&self, _ns: &Namespace) -> Result<(), StoreError> {
        self.fail()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.fail()
    }
}

/// A canonical record shaped like a registered eduID user
pub fn sample_user(id: &UserId) -> Document {
    doc(json!({
        "_id": id.to_hex(),
        "eduPersonPrincipalName": "hubba-bubba",
        "givenName": "John",
        "surname": "Smith",
        "mail": "johnsmith@example.com",
        "mailAliases": [
            {"email": "johnsmith@example.com", "verified": true},
            {"email": "johnsmith2@example.com", "verified": false}
        ],
        "norEduPersonNIN": [
            {"norEduPersonNIN": "197801011234", "verified": true, "status": "active"}
        ],
        "mobile": [
            {"mobile": "+46700011336", "verified": true}
        ]
    }))
}

/// In-memory client plus a handle on its backend for inspection
pub fn memory_client() -> (MemoryBackend, Client) {
    let backend = MemoryBackend::new();
    let client = Client::with_backend(Arc::new(backend.clone()));
    (backend, client)
}

/// Client whose backend always fails
pub fn failing_client() -> Client {
    Client::with_backend(Arc::new(FailingBackend::default()))
}

/// Namespace of the canonical collection in [`TEST_DATABASE`]
pub fn attributes_ns() -> Namespace {
    Namespace::new(TEST_DATABASE, ATTRIBUTES_COLLECTION)
}

/// Insert `record` into the canonical collection
pub async fn seed_canonical(backend: &MemoryBackend, record: Document) {
    backend
        .insert_one(&attributes_ns(), record)
        .await
        .expect("seed canonical record");
}

/// Insert a `user` document with `_id = id` into an application's database
pub async fn seed_source_user(backend: &MemoryBackend, app: &str, id: &UserId, fields: Value) {
    let mut record = doc(fields);
    record.insert(ID_FIELD.to_string(), (*id).into());
    backend
        .insert_one(&Namespace::new(app, "user"), record)
        .await
        .expect("seed source user");
}

/// Registry spec for an already built fetcher
pub fn plugin(name: &str, fetcher: impl Fetcher + 'static) -> PluginSpec {
    PluginSpec::ready(name, Arc::new(fetcher))
}

/// Registry loaded from `specs`
pub fn registry_with(specs: Vec<PluginSpec>) -> PluginRegistry {
    PluginRegistry::load(specs)
}
