//! Append-only moderation log storage trait.

use serde::{Deserialize, Serialize};
use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::StoreError;

/// Outcome of a logged transition or attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutcome {
    Success,
    Error,
    Skipped,
    NoChange,
    /// Record closed without action (principal already gone).
    Closed,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutcome::Success => "success",
            LogOutcome::Error => "error",
            LogOutcome::Skipped => "skipped",
            LogOutcome::NoChange => "nochange",
            LogOutcome::Closed => "closed",
        }
    }
}

/// One write-once row per transition attempt. Used for audit and for
/// diagnosing reconciliation races; never updated or deleted, except by
/// retention trimming on age.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub principal_id: PrincipalId,
    pub action: String,
    pub outcome: LogOutcome,
    pub detail: Option<String>,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl ModerationLogEntry {
    pub fn new(
        principal_id: PrincipalId,
        action: impl Into<String>,
        outcome: LogOutcome,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            principal_id,
            action: action.into(),
            outcome,
            detail: None,
            error: None,
            timestamp,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Trait for the append-only moderation log.
pub trait ModerationLogStore {
    /// Append one entry.
    fn append_log(&self, group: &GroupId, entry: ModerationLogEntry) -> Result<(), StoreError>;

    /// All entries for a principal, oldest first.
    fn log_for_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Vec<ModerationLogEntry>, StoreError>;

    /// Delete entries older than `cutoff`; returns how many were removed.
    fn trim_log_before(&self, group: &GroupId, cutoff: Timestamp) -> Result<u64, StoreError>;
}
