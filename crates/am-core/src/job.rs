//! Update jobs and their outcomes

use am_store::MergeReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Process-local job identifier for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Generate new job ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to pull one application's view of one user
///
/// Wire shape: `{"app_name": "...", "user_id": "..."}`. The user id stays a
/// string until the orchestrator parses it, so a malformed id is an outcome
/// rather than a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateJob {
    /// Source application name
    pub app_name: String,
    /// User identifier text
    pub user_id: String,
    #[serde(skip)]
    id: JobId,
}

impl UpdateJob {
    /// Create job
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            id: JobId::new(),
        }
    }

    /// Decode a JSON payload
    ///
    /// # Errors
    /// Malformed JSON, missing fields or unknown fields
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Correlation id assigned when the job was created or decoded
    #[inline]
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }
}

/// How a job ended when no fault occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Attributes were merged
    Applied(MergeReport),
    /// No fetcher is registered for the application
    PluginMissing,
    /// The user id is not a well-formed identifier
    InvalidIdentifier,
    /// The application has no data for the user
    SourceUserMissing,
}

impl UpdateOutcome {
    /// Check if attributes were merged
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::PluginMissing => "plugin_missing",
            Self::InvalidIdentifier => "invalid_identifier",
            Self::SourceUserMissing => "source_user_missing",
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
