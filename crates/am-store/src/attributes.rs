//! Canonical attribute store
//!
//! [`AttributeStore`] is the only writer of the canonical `attributes`
//! collection. It owns the index definitions and asserts them on first use in
//! every process.

use crate::backend::{FindOptions, IndexModel};
use crate::client::{Collection, Cursor, Database};
use crate::document::{Document, ID_FIELD};
use crate::error::StoreError;
use crate::filter::{Filter, Projection};
use crate::id::UserId;
use crate::modifier::MergeOp;
use serde_json::Value;
use tokio::sync::OnceCell;

/// Collection holding canonical records
pub const ATTRIBUTES_COLLECTION: &str = "attributes";

/// Indexes required before the collection is safe to read or write
#[must_use]
pub fn canonical_indexes() -> Vec<IndexModel> {
    vec![
        IndexModel::new("email-index", ["email"]),
        IndexModel::new(
            "norEduPersonNIN-index",
            [
                "norEduPersonNIN.norEduPersonNIN",
                "norEduPersonNIN.verified",
                "norEduPersonNIN.status",
            ],
        ),
        IndexModel::new("mobile-index", ["mobile.mobile", "mobile.verified"]),
    ]
}

/// How a merge was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Modifier update on an existing record
    Partial,
    /// Whole-document upsert
    Replace,
}

/// Result of [`AttributeStore::merge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Mode used
    pub mode: MergeMode,
    /// An existing record matched the identifier
    pub matched: bool,
    /// The stored record changed
    pub modified: bool,
    /// A new record was created
    pub created: bool,
}

impl MergeReport {
    fn noop() -> Self {
        Self {
            mode: MergeMode::Partial,
            matched: false,
            modified: false,
            created: false,
        }
    }
}

/// Typed access to the canonical attribute collection
#[derive(Debug)]
pub struct AttributeStore {
    collection: Collection,
    indexes: OnceCell<()>,
}

impl AttributeStore {
    /// Bind to the `attributes` collection of `database`
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(ATTRIBUTES_COLLECTION),
            indexes: OnceCell::new(),
        }
    }

    /// Assert the required indexes
    ///
    /// Idempotent; other operations call this once per store instance.
    ///
    /// # Errors
    /// `StoreError::IndexConflict` if an index of the same name has other keys
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        for index in canonical_indexes() {
            let created = self.collection.create_index(&index).await?;
            if created {
                tracing::info!(
                    index = %index.name,
                    ns = %self.collection.namespace(),
                    "created index"
                );
            }
        }
        Ok(())
    }

    async fn ready(&self) -> Result<&Collection, StoreError> {
        self.indexes
            .get_or_try_init(|| self.ensure_indexes())
            .await?;
        Ok(&self.collection)
    }

    /// The single record whose `field` equals `value`
    ///
    /// # Errors
    /// `StoreError::AmbiguousRecord` if more than one record matches
    #[tracing::instrument(level = "debug", skip(self, value), fields(value = %value))]
    pub async fn lookup_by_field(
        &self,
        field: &str,
        value: Value,
    ) -> Result<Option<Document>, StoreError> {
        let filter = Filter::eq(field, value.clone());
        let mut docs = self.ready().await?.find_limited(&filter, 2).await?;
        match docs.len() {
            0 => Ok(None),
            1 => Ok(docs.pop()),
            _ => {
                tracing::error!(
                    field,
                    value = %value,
                    "uniqueness violated: multiple records match"
                );
                Err(StoreError::ambiguous(field, &value))
            }
        }
    }

    /// The record with primary key `id`
    ///
    /// # Errors
    /// `StoreError::AmbiguousRecord` if the store holds duplicate ids
    pub async fn lookup_by_id(&self, id: &UserId) -> Result<Option<Document>, StoreError> {
        self.lookup_by_field(ID_FIELD, (*id).into()).await
    }

    /// Like [`lookup_by_field`](Self::lookup_by_field) but a miss is an error
    ///
    /// # Errors
    /// `StoreError::RecordNotFound` or `StoreError::AmbiguousRecord`
    pub async fn require_by_field(
        &self,
        field: &str,
        value: Value,
    ) -> Result<Document, StoreError> {
        match self.lookup_by_field(field, value.clone()).await? {
            Some(doc) => Ok(doc),
            None => Err(StoreError::not_found(field, &value)),
        }
    }

    /// Like [`lookup_by_id`](Self::lookup_by_id) but a miss is an error
    ///
    /// # Errors
    /// `StoreError::RecordNotFound` or `StoreError::AmbiguousRecord`
    pub async fn require_by_id(&self, id: &UserId) -> Result<Document, StoreError> {
        self.require_by_field(ID_FIELD, (*id).into()).await
    }

    /// Whether at least one record has `field == value`
    ///
    /// # Errors
    /// Backend errors
    pub async fn exists_by_field(&self, field: &str, value: Value) -> Result<bool, StoreError> {
        let filter = Filter::eq(field, value);
        Ok(!self.ready().await?.find_limited(&filter, 1).await?.is_empty())
    }

    /// Bulk read; no uniqueness check
    ///
    /// # Errors
    /// Filter validation and backend errors
    pub async fn query(
        &self,
        filter: &Filter,
        projection: Option<Projection>,
    ) -> Result<Cursor, StoreError> {
        let options = FindOptions {
            projection,
            limit: None,
        };
        self.ready().await?.find(filter, &options).await
    }

    /// Merge fetched attributes into the record for `id`
    ///
    /// `Partial` updates the existing record atomically and never creates one.
    /// `Replace` stores the document under `id`, creating or overwriting it.
    ///
    /// # Errors
    /// Modifier errors, `StoreError::DuplicateKey` and backend errors
    #[tracing::instrument(
        level = "debug",
        skip(self, op),
        fields(user = %id, partial = op.is_partial())
    )]
    pub async fn merge(&self, id: &UserId, op: MergeOp) -> Result<MergeReport, StoreError> {
        let collection = self.ready().await?;
        let filter = Filter::by_id(id);

        match op {
            MergeOp::Partial(modifiers) if modifiers.is_empty() => {
                tracing::debug!("empty modifier set, nothing to merge");
                Ok(MergeReport::noop())
            }
            MergeOp::Partial(modifiers) => {
                let result = collection.update_one(&filter, &modifiers).await?;
                if result.matched == 0 {
                    tracing::warn!(user = %id, "partial update matched no canonical record");
                }
                Ok(MergeReport {
                    mode: MergeMode::Partial,
                    matched: result.matched > 0,
                    modified: result.modified > 0,
                    created: false,
                })
            }
            MergeOp::Replace(mut doc) => {
                let id_value: Value = (*id).into();
                if let Some(supplied) = doc.insert(ID_FIELD.to_string(), id_value.clone()) {
                    if supplied != id_value {
                        tracing::warn!(
                            user = %id,
                            supplied = %supplied,
                            "ignoring _id supplied by fetcher"
                        );
                    }
                }
                let result = collection.replace_one(&filter, doc, true).await?;
                Ok(MergeReport {
                    mode: MergeMode::Replace,
                    matched: result.matched > 0,
                    modified: result.modified > 0 || result.upserted,
                    created: result.upserted,
                })
            }
        }
    }

    /// Underlying collection handle
    #[inline]
    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }
}
