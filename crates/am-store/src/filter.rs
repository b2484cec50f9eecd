//! Query filters and projections
//!
//! [`Filter`] holds `field -> condition` pairs that must all hold. A condition
//! is either a literal (equality) or an operator object such as
//! `{"$in": [...]}`. [`Projection`] trims returned documents to a field list.

use crate::document::{collect_path, get_path, set_path, Document, ID_FIELD};
use crate::error::StoreError;
use crate::id::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OPERATORS: &[&str] = &["$eq", "$ne", "$in", "$exists"];

/// Conjunction of field conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Document);

impl Filter {
    /// Filter matching every document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single field equality
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_eq(field, value)
    }

    /// Filter on the primary key
    #[must_use]
    pub fn by_id(id: &UserId) -> Self {
        Self::eq(ID_FIELD, *id)
    }

    /// Add another equality condition
    #[must_use]
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Add an arbitrary condition (literal or operator object)
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, condition: Value) -> Self {
        self.0.insert(field.into(), condition);
        self
    }

    /// Build from a raw condition document
    ///
    /// # Errors
    /// `StoreError::InvalidFilter` if an operator object is malformed
    pub fn from_document(doc: Document) -> Result<Self, StoreError> {
        let filter = Self(doc);
        filter.validate()?;
        Ok(filter)
    }

    /// Conditions as a document
    #[inline]
    #[must_use]
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Literal value required for `field`, if the filter pins one
    #[must_use]
    pub fn pinned(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| operator_object(v).is_none())
    }

    /// Check every operator object is well-formed
    ///
    /// # Errors
    /// `StoreError::InvalidFilter` naming the offending field
    pub fn validate(&self) -> Result<(), StoreError> {
        for (field, condition) in &self.0 {
            if field.is_empty() {
                return Err(StoreError::InvalidFilter("empty field name".to_string()));
            }
            let Some(ops) = operator_object(condition) else {
                continue;
            };
            for (op, arg) in ops {
                match op.as_str() {
                    "$in" if !arg.is_array() => {
                        return Err(StoreError::InvalidFilter(format!(
                            "{field}: $in expects an array"
                        )));
                    }
                    "$exists" if !arg.is_boolean() => {
                        return Err(StoreError::InvalidFilter(format!(
                            "{field}: $exists expects a boolean"
                        )));
                    }
                    known if OPERATORS.contains(&known) => {}
                    unknown => {
                        return Err(StoreError::InvalidFilter(format!(
                            "{field}: unknown operator {unknown}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check whether `doc` satisfies every condition
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(field, condition)| {
            let found = collect_path(doc, field);
            match operator_object(condition) {
                None => found.iter().any(|v| value_matches(v, condition)),
                Some(ops) => ops.iter().all(|(op, arg)| match op.as_str() {
                    "$eq" => found.iter().any(|v| value_matches(v, arg)),
                    "$ne" => !found.iter().any(|v| value_matches(v, arg)),
                    "$in" => arg.as_array().is_some_and(|options| {
                        options
                            .iter()
                            .any(|opt| found.iter().any(|v| value_matches(v, opt)))
                    }),
                    "$exists" => arg.as_bool() == Some(!found.is_empty()),
                    _ => false,
                }),
            }
        })
    }
}

impl From<Document> for Filter {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

fn operator_object(value: &Value) -> Option<&Document> {
    match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

/// A stored value matches a condition if equal, or if it is an array holding it
fn value_matches(stored: &Value, expected: &Value) -> bool {
    stored == expected || matches!(stored, Value::Array(items) if items.contains(expected))
}

/// Field inclusion list applied to query results
///
/// `_id` is always kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    /// Include only the given fields
    #[must_use]
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Included field paths
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Produce the projected copy of `doc`
    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = Document::new();
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
        for field in &self.fields {
            if let Some(value) = get_path(doc, field) {
                // Intermediates are freshly created objects, so this cannot conflict.
                let _ = set_path(&mut out, field, value.clone());
            }
        }
        out
    }
}
