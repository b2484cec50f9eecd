//! AM Store - canonical attribute records and document backends
//!
//! Provides:
//! - [`UserId`], the 12-byte user identifier
//! - [`Filter`] and [`MergeOp`] with document-database matching and update semantics
//! - [`Client`] handles over a pluggable [`Backend`]
//! - [`AttributeStore`], the accessor that owns the canonical `attributes` collection
//!
//! # Example
//!
//! ```rust,ignore
//! use am_store::{AttributeStore, Client, MergeOp, Modifier, UserId};
//!
//! # async fn example() -> Result<(), am_store::StoreError> {
//! let client = Client::connect("memory://")?;
//! let store = AttributeStore::new(&client.database("am"));
//!
//! let id = UserId::new();
//! store.merge(&id, MergeOp::partial([Modifier::set("email", "a@example.com")])).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

mod attributes;
pub mod backend;
mod client;
pub mod document;
mod error;
mod filter;
mod id;
mod modifier;

pub use attributes::{
    canonical_indexes, AttributeStore, MergeMode, MergeReport, ATTRIBUTES_COLLECTION,
};
pub use backend::{
    Backend, FindOptions, IndexDirection, IndexModel, MemoryBackend, Namespace, UpdateResult,
};
pub use client::{Client, Collection, Cursor, Database, MEMORY_SCHEME};
pub use document::{Document, ID_FIELD};
pub use error::StoreError;
pub use filter::{Filter, Projection};
pub use id::{IdError, UserId};
pub use modifier::{apply_all, MergeOp, Modifier, MODIFIER_PREFIX};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
