//! Store client and handles
//!
//! A [`Client`] is created once at startup and cloned wherever a store is
//! needed. [`Client::database`] yields a [`Database`] addressed by logical
//! name; the canonical store and every source application go through the
//! same client.

use crate::backend::{Backend, FindOptions, IndexModel, MemoryBackend, Namespace, UpdateResult};
use crate::document::Document;
use crate::error::StoreError;
use crate::filter::Filter;
use crate::modifier::Modifier;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// URI scheme served by [`MemoryBackend`]
pub const MEMORY_SCHEME: &str = "memory";

/// Shared handle to a document backend
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
    uri: String,
}

impl Client {
    /// Connect using a URI-style connection string
    ///
    /// `memory://...` creates a fresh [`MemoryBackend`].
    ///
    /// # Errors
    /// - `StoreError::InvalidUri` if the string has no `scheme://`
    /// - `StoreError::UnsupportedScheme` for any scheme without a bundled backend
    pub fn connect(uri: &str) -> Result<Self, StoreError> {
        let (scheme, _rest) = uri
            .split_once("://")
            .ok_or_else(|| StoreError::InvalidUri(uri.to_string()))?;
        if scheme.is_empty() {
            return Err(StoreError::InvalidUri(uri.to_string()));
        }

        match scheme {
            MEMORY_SCHEME => {
                tracing::debug!(uri, "using in-memory document backend");
                Ok(Self {
                    backend: Arc::new(MemoryBackend::new()),
                    uri: uri.to_string(),
                })
            }
            other => Err(StoreError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Wrap an existing backend
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            uri: String::from("custom://"),
        }
    }

    /// Connection string this client was built from
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Handle for a logical database
    #[must_use]
    pub fn database(&self, name: &str) -> Database {
        Database {
            backend: Arc::clone(&self.backend),
            name: name.to_string(),
        }
    }

    /// Connectivity check
    ///
    /// # Errors
    /// Backend transport errors
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("uri", &self.uri)
            .field("backend", &self.backend)
            .finish()
    }
}

/// Logical database handle
#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn Backend>,
    name: String,
}

impl Database {
    /// Database name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for a collection in this database
    #[must_use]
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            backend: Arc::clone(&self.backend),
            ns: Namespace::new(self.name.clone(), name),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish()
    }
}

/// Collection handle
#[derive(Clone)]
pub struct Collection {
    backend: Arc<dyn Backend>,
    ns: Namespace,
}

impl Collection {
    /// Namespace of this collection
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// Lazily consumed result set
    ///
    /// # Errors
    /// Filter validation and backend errors
    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Cursor, StoreError> {
        let docs = self.backend.find(&self.ns, filter, options).await?;
        Ok(Cursor::from_documents(docs))
    }

    /// Up to `limit` matching documents
    ///
    /// # Errors
    /// Filter validation and backend errors
    pub async fn find_limited(
        &self,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        self.backend
            .find(&self.ns, filter, &FindOptions::default().with_limit(limit))
            .await
    }

    /// First matching document
    ///
    /// # Errors
    /// Filter validation and backend errors
    pub async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Ok(self.find_limited(filter, 1).await?.into_iter().next())
    }

    /// Count matching documents
    ///
    /// # Errors
    /// Filter validation and backend errors
    pub async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.backend.count(&self.ns, filter).await
    }

    /// Insert a document
    ///
    /// # Errors
    /// `StoreError::DuplicateKey` and backend errors
    pub async fn insert_one(&self, doc: Document) -> Result<(), StoreError> {
        self.backend.insert_one(&self.ns, doc).await
    }

    /// Replace the first match, optionally inserting
    ///
    /// # Errors
    /// `StoreError::ImmutableField`, `StoreError::DuplicateKey` and backend errors
    pub async fn replace_one(
        &self,
        filter: &Filter,
        replacement: Document,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        self.backend
            .replace_one(&self.ns, filter, replacement, upsert)
            .await
    }

    /// Apply modifiers to the first match
    ///
    /// # Errors
    /// Modifier errors, `StoreError::DuplicateKey` and backend errors
    pub async fn update_one(
        &self,
        filter: &Filter,
        modifiers: &[Modifier],
    ) -> Result<UpdateResult, StoreError> {
        self.backend.update_one(&self.ns, filter, modifiers).await
    }

    /// Create an index if missing
    ///
    /// # Errors
    /// `StoreError::IndexConflict`, `StoreError::DuplicateKey` and backend errors
    pub async fn create_index(&self, index: &IndexModel) -> Result<bool, StoreError> {
        self.backend.create_index(&self.ns, index).await
    }

    /// Defined indexes
    ///
    /// # Errors
    /// Backend errors
    pub async fn list_indexes(&self) -> Result<Vec<IndexModel>, StoreError> {
        self.backend.list_indexes(&self.ns).await
    }

    /// Drop the collection
    ///
    /// # Errors
    /// Backend errors
    pub async fn drop(&self) -> Result<(), StoreError> {
        self.backend.drop_collection(&self.ns).await
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection").field("ns", &self.ns).finish()
    }
}

/// Forward-only stream of query results
///
/// Finite and not restartable; reflects the state of the store when the query
/// ran.
pub struct Cursor {
    inner: BoxStream<'static, Result<Document, StoreError>>,
}

impl Cursor {
    /// Cursor over an already materialised result set
    #[must_use]
    pub fn from_documents(docs: Vec<Document>) -> Self {
        Self {
            inner: stream::iter(docs.into_iter().map(Ok)).boxed(),
        }
    }
}

impl Stream for Cursor {
    type Item = Result<Document, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    #[test]
    fn connect_memory_scheme() {
        let client = Client::connect("memory://local").unwrap();
        assert_eq!(client.uri(), "memory://local");
    }

    #[test]
    fn connect_rejects_unknown_scheme() {
        let err = Client::connect("mongodb://localhost:27017/").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedScheme(s) if s == "mongodb"));
    }

    #[test]
    fn connect_rejects_garbage() {
        assert!(matches!(
            Client::connect("localhost"),
            Err(StoreError::InvalidUri(_))
        ));
        assert!(matches!(
            Client::connect("://x"),
            Err(StoreError::InvalidUri(_))
        ));
    }

    #[tokio::test]
    async fn databases_share_one_backend_but_not_namespaces() {
        let client = Client::connect("memory://").unwrap();
        let app = client.database("app1").collection("user");
        let am = client.database("am").collection("user");

        app.insert_one(json!({"_id": "u1"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        assert_eq!(app.count(&Filter::new()).await.unwrap(), 1);
        assert_eq!(am.count(&Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cursor_yields_each_document_once() {
        let docs: Vec<Document> = (0..3)
            .map(|i| json!({"_id": i}).as_object().cloned().unwrap())
            .collect();
        let cursor = Cursor::from_documents(docs.clone());
        let collected: Vec<Document> = cursor.try_collect().await.unwrap();
        assert_eq!(collected, docs);
    }
}
