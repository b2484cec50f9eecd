//! Document backends
//!
//! [`Backend`] is the slice of a document database the attribute manager
//! relies on. The bundled [`MemoryBackend`] serves tests and local dry runs;
//! production deployments plug their own implementation into
//! [`Client::with_backend`](crate::Client::with_backend).

use crate::document::Document;
use crate::error::StoreError;
use crate::filter::{Filter, Projection};
use crate::modifier::Modifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

mod memory;

pub use memory::MemoryBackend;

/// Database and collection pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace {
    /// Logical database name
    pub database: String,
    /// Collection name
    pub collection: String,
}

impl Namespace {
    /// Create namespace
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Options for [`Backend::find`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Fields to return
    pub projection: Option<Projection>,
    /// Maximum number of documents
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Limit the result count
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict returned fields
    #[inline]
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Outcome of a single-document write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the filter (0 or 1)
    pub matched: u64,
    /// Documents whose content changed
    pub modified: u64,
    /// Whether a new document was inserted
    pub upserted: bool,
}

/// Sort direction of an index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexDirection {
    /// Ascending
    #[default]
    Ascending,
    /// Descending
    Descending,
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    /// Index name
    pub name: String,
    /// Key paths in order
    pub keys: Vec<(String, IndexDirection)>,
    /// Reject documents sharing a key tuple
    pub unique: bool,
}

impl IndexModel {
    /// Ascending non-unique index over `keys`
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys
                .into_iter()
                .map(|k| (k.into(), IndexDirection::Ascending))
                .collect(),
            unique: false,
        }
    }

    /// Mark unique
    #[inline]
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Key paths
    pub fn key_paths(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(k, _)| k.as_str())
    }
}

/// Document database operations
///
/// Single-document writes must be atomic per document. Implementations are
/// shared across concurrent jobs.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Point-in-time read of matching documents, in storage order
    async fn find(
        &self,
        ns: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Count matching documents
    async fn count(&self, ns: &Namespace, filter: &Filter) -> Result<u64, StoreError>;

    /// Insert a document carrying an `_id`
    async fn insert_one(&self, ns: &Namespace, doc: Document) -> Result<(), StoreError>;

    /// Replace the first match; insert when `upsert` and nothing matches
    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: &Filter,
        replacement: Document,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError>;

    /// Apply modifiers atomically to the first match
    async fn update_one(
        &self,
        ns: &Namespace,
        filter: &Filter,
        modifiers: &[Modifier],
    ) -> Result<UpdateResult, StoreError>;

    /// Create an index; `Ok(false)` if an identical one already exists
    async fn create_index(&self, ns: &Namespace, index: &IndexModel) -> Result<bool, StoreError>;

    /// Indexes defined on a collection
    async fn list_indexes(&self, ns: &Namespace) -> Result<Vec<IndexModel>, StoreError>;

    /// Remove a collection with its documents and indexes
    async fn drop_collection(&self, ns: &Namespace) -> Result<(), StoreError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
