//! Merge operations
//!
//! A fetcher hands back a [`MergeOp`]: either a list of [`Modifier`]s applied
//! atomically to an existing record, or a complete document that replaces it.

use crate::document::{get_path_mut, remove_path, set_path, Document, ID_FIELD};
use crate::error::StoreError;
use serde_json::{Number, Value};

/// Key prefix marking a modifier directive in the legacy attribute shape
pub const MODIFIER_PREFIX: char = '$';

/// Field-level update directive
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Set `path` to `value`
    Set {
        /// Target path
        path: String,
        /// New value
        value: Value,
    },

    /// Remove `path`
    Unset {
        /// Target path
        path: String,
    },

    /// Add `by` to the number at `path` (missing counts as zero)
    Inc {
        /// Target path
        path: String,
        /// Increment
        by: Number,
    },

    /// Append `value` to the array at `path`
    Push {
        /// Target path
        path: String,
        /// Appended value
        value: Value,
    },

    /// Append `value` to the array at `path` unless already present
    AddToSet {
        /// Target path
        path: String,
        /// Appended value
        value: Value,
    },
}

impl Modifier {
    /// `$set`
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `$unset`
    pub fn unset(path: impl Into<String>) -> Self {
        Self::Unset { path: path.into() }
    }

    /// `$inc`
    pub fn inc(path: impl Into<String>, by: impl Into<Number>) -> Self {
        Self::Inc {
            path: path.into(),
            by: by.into(),
        }
    }

    /// `$push`
    pub fn push(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Push {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `$addToSet`
    pub fn add_to_set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::AddToSet {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Target path
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. }
            | Self::Unset { path }
            | Self::Inc { path, .. }
            | Self::Push { path, .. }
            | Self::AddToSet { path, .. } => path,
        }
    }

    /// Operator name in the legacy shape
    #[must_use]
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Set { .. } => "$set",
            Self::Unset { .. } => "$unset",
            Self::Inc { .. } => "$inc",
            Self::Push { .. } => "$push",
            Self::AddToSet { .. } => "$addToSet",
        }
    }

    /// Apply to `doc` in place
    ///
    /// # Errors
    /// - `StoreError::ImmutableField` when targeting `_id`
    /// - `StoreError::TypeMismatch` when `$inc`/`$push` meet the wrong type
    /// - `StoreError::PathConflict` when the path crosses a scalar
    pub fn apply(&self, doc: &mut Document) -> Result<(), StoreError> {
        let path = self.path();
        if path == ID_FIELD || path.starts_with("_id.") {
            return Err(StoreError::ImmutableField(path.to_string()));
        }

        match self {
            Self::Set { value, .. } => set_path(doc, path, value.clone()),
            Self::Unset { .. } => {
                remove_path(doc, path);
                Ok(())
            }
            Self::Inc { by, .. } => match get_path_mut(doc, path) {
                None => set_path(doc, path, Value::Number(by.clone())),
                Some(Value::Number(current)) => {
                    *current = add_numbers(current, by).ok_or_else(|| StoreError::TypeMismatch {
                        path: path.to_string(),
                        expected: "finite number",
                    })?;
                    Ok(())
                }
                Some(_) => Err(StoreError::TypeMismatch {
                    path: path.to_string(),
                    expected: "number",
                }),
            },
            Self::Push { value, .. } | Self::AddToSet { value, .. } => {
                let unique = matches!(self, Self::AddToSet { .. });
                match get_path_mut(doc, path) {
                    None => set_path(doc, path, Value::Array(vec![value.clone()])),
                    Some(Value::Array(items)) => {
                        if !(unique && items.contains(value)) {
                            items.push(value.clone());
                        }
                        Ok(())
                    }
                    Some(_) => Err(StoreError::TypeMismatch {
                        path: path.to_string(),
                        expected: "array",
                    }),
                }
            }
        }
    }

    fn parse(operator: &str, path: String, arg: Value) -> Result<Self, StoreError> {
        Ok(match operator {
            "$set" => Self::Set { path, value: arg },
            "$unset" => Self::Unset { path },
            "$inc" => match arg {
                Value::Number(by) => Self::Inc { path, by },
                other => {
                    return Err(StoreError::InvalidModifier(format!(
                        "$inc {path} expects a number, got {other}"
                    )))
                }
            },
            "$push" => Self::Push { path, value: arg },
            "$addToSet" => Self::AddToSet { path, value: arg },
            unknown => return Err(StoreError::UnsupportedModifier(unknown.to_string())),
        })
    }
}

fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(sum.into());
        }
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?)
}

/// Apply modifiers all-or-nothing
///
/// # Errors
/// The first modifier error; `doc` is left untouched in that case
pub fn apply_all(doc: &mut Document, modifiers: &[Modifier]) -> Result<(), StoreError> {
    let mut staged = doc.clone();
    for modifier in modifiers {
        modifier.apply(&mut staged)?;
    }
    *doc = staged;
    Ok(())
}

/// What a fetcher wants done to the canonical record
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOp {
    /// Atomic field-level update of an existing record; never creates one
    Partial(Vec<Modifier>),

    /// Whole-document upsert
    Replace(Document),
}

impl MergeOp {
    /// Partial update from modifiers
    #[must_use]
    pub fn partial(modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Self::Partial(modifiers.into_iter().collect())
    }

    /// Full replacement
    #[must_use]
    pub fn replace(doc: Document) -> Self {
        Self::Replace(doc)
    }

    /// Classify a legacy attribute mapping by key shape
    ///
    /// Every key `$`-prefixed: each is an operator mapping paths to arguments,
    /// e.g. `{"$set": {"email": "a@example.com"}}`. No key prefixed: the
    /// mapping is a replacement document. An empty mapping is a no-op partial
    /// update.
    ///
    /// # Errors
    /// - `StoreError::MixedMergePayload` if prefixed and plain keys are mixed
    /// - `StoreError::InvalidModifier` if an operator argument is not an object
    /// - `StoreError::UnsupportedModifier` for unknown operators
    pub fn from_attributes(attributes: Document) -> Result<Self, StoreError> {
        if attributes.is_empty() {
            return Ok(Self::Partial(Vec::new()));
        }

        let prefixed = attributes
            .keys()
            .filter(|k| k.starts_with(MODIFIER_PREFIX))
            .count();
        if prefixed == 0 {
            return Ok(Self::Replace(attributes));
        }
        if prefixed != attributes.len() {
            return Err(StoreError::MixedMergePayload);
        }

        let mut modifiers = Vec::new();
        for (operator, arg) in attributes {
            let Value::Object(fields) = arg else {
                return Err(StoreError::InvalidModifier(format!(
                    "{operator} expects an object of paths"
                )));
            };
            for (path, value) in fields {
                modifiers.push(Modifier::parse(&operator, path, value)?);
            }
        }
        Ok(Self::Partial(modifiers))
    }

    /// Check for a field-level update
    #[inline]
    #[must_use]
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial(_))
    }

    /// Check for an update that would change nothing
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Partial(mods) if mods.is_empty())
    }
}
