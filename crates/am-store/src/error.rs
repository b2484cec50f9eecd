//! Error types for the attribute store
//!
//! Covers:
//! - Uniqueness violations on canonical lookups
//! - Malformed filters and modifier directives
//! - Index management failures
//! - Backend connectivity faults

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// More than one canonical record matched a lookup expected to be unique
    #[error("multiple records match {field}='{value}'")]
    AmbiguousRecord {
        /// Field used for the lookup
        field: String,
        /// Rendered lookup value
        value: String,
    },

    /// No record matched a lookup that required one
    #[error("no record matches {field}='{value}'")]
    RecordNotFound {
        /// Field used for the lookup
        field: String,
        /// Rendered lookup value
        value: String,
    },

    /// Write would violate a unique index
    #[error("duplicate key for index {index}: {key}")]
    DuplicateKey {
        /// Index name
        index: String,
        /// Rendered key tuple
        key: String,
    },

    /// Index name already defined with different keys
    #[error("index {name} already exists with a different definition")]
    IndexConflict {
        /// Index name
        name: String,
    },

    /// Malformed query filter
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Malformed modifier directive
    #[error("invalid modifier: {0}")]
    InvalidModifier(String),

    /// Modifier operator this store does not implement
    #[error("unsupported modifier: {0}")]
    UnsupportedModifier(String),

    /// Attribute mapping mixes modifier directives with plain fields
    #[error("merge payload mixes modifier directives and document fields")]
    MixedMergePayload,

    /// Attempt to modify a field that may not change
    #[error("field is immutable: {0}")]
    ImmutableField(String),

    /// Path traverses a value that cannot hold children
    #[error("cannot traverse non-object value at {path}")]
    PathConflict {
        /// Offending path
        path: String,
    },

    /// Modifier applied to a value of the wrong type
    #[error("type mismatch at {path}: expected {expected}")]
    TypeMismatch {
        /// Offending path
        path: String,
        /// Expected type name
        expected: &'static str,
    },

    /// Connection string could not be parsed
    #[error("invalid connection uri: {0}")]
    InvalidUri(String),

    /// Connection scheme has no bundled backend
    #[error("unsupported connection scheme: {0}")]
    UnsupportedScheme(String),

    /// Connectivity or server fault
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON encoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Check whether retrying the same operation may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check whether this is a uniqueness violation on lookup
    #[inline]
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousRecord { .. })
    }

    /// Create an ambiguous-record error
    pub fn ambiguous(field: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::AmbiguousRecord {
            field: field.into(),
            value: render_value(value),
        }
    }

    /// Create a record-not-found error
    pub fn not_found(field: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::RecordNotFound {
            field: field.into(),
            value: render_value(value),
        }
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
