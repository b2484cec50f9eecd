//! Fetcher contract
//!
//! A fetcher reads one source application's view of a user and describes how
//! the canonical record should change.

use am_store::{Database, MergeOp, StoreError, UserId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Failure of a single fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source application has no data for this user
    ///
    /// Terminal for the job; distinct from an empty result.
    #[error("user {user_id} does not exist in the source application")]
    UserNotFound {
        /// User that was looked up
        user_id: UserId,
    },

    /// Source store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other fetcher failure
    #[error("fetch failed: {0}")]
    Failed(String),
}

impl FetchError {
    /// Shorthand for [`FetchError::UserNotFound`]
    #[inline]
    #[must_use]
    pub fn user_not_found(user_id: &UserId) -> Self {
        Self::UserNotFound { user_id: *user_id }
    }
}

/// Retrieves one application's attributes for a user
///
/// Implementations are shared across concurrent jobs. `source` is the
/// application's own logical database, valid for the duration of the call.
#[async_trait]
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Fetch attributes for `user_id`
    ///
    /// An empty [`MergeOp::Partial`] is a valid "nothing to merge yet" result.
    async fn fetch(&self, source: &Database, user_id: &UserId) -> Result<MergeOp, FetchError>;
}
