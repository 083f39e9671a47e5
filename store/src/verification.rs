//! Verification state storage trait.

use serde::{Deserialize, Serialize};
use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::StoreError;

/// Lifecycle status of a principal's verification record.
///
/// `Pending` is the only non-terminal status. Every other status is
/// reached through a transition function and, except for jailed rejoin
/// handling, is never left again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Jailed,
    Kicked,
    Banned,
    Left,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Jailed => "jailed",
            VerificationStatus::Kicked => "kicked",
            VerificationStatus::Banned => "banned",
            VerificationStatus::Left => "left",
        }
    }
}

/// One verification record per (group, principal).
///
/// Invariant: `deadline_at` is `Some` iff `status == Pending`. Records
/// are never deleted; terminal rows are retained for audit and for the
/// jailed-rejoin path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub principal_id: PrincipalId,
    pub fail_count: u32,
    pub joined_at: Timestamp,
    pub deadline_at: Option<Timestamp>,
    pub status: VerificationStatus,
    pub last_action_at: Timestamp,
}

impl VerificationRecord {
    /// Whether the pending-iff-deadline invariant holds for this record.
    pub fn invariant_holds(&self) -> bool {
        (self.status == VerificationStatus::Pending) == self.deadline_at.is_some()
    }
}

/// Trait for storing per-principal verification state.
///
/// The `mark_*` methods are status-preconditioned: they write only while
/// the record is still `Pending` and report whether the write applied.
/// Backends must make each of them a single atomic read-modify-write.
pub trait VerificationStore {
    /// Open (or re-open) a probation window. Preserves any existing
    /// `fail_count` so re-verification after a kick escalates correctly.
    fn upsert_pending(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        joined_at: Timestamp,
        deadline_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Fetch the record for a principal, if one exists.
    fn get_record(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<VerificationRecord>, StoreError>;

    /// All `Pending` records whose deadline has elapsed, ordered by
    /// deadline ascending.
    fn due_pending(
        &self,
        group: &GroupId,
        now: Timestamp,
    ) -> Result<Vec<VerificationRecord>, StoreError>;

    /// Number of `Pending` records in the group.
    fn pending_count(&self, group: &GroupId) -> Result<u64, StoreError>;

    /// Transition to `Verified`: fail count reset, deadline cleared.
    /// Upserts if no record exists (out-of-band verification).
    fn set_verified(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Transition to `Jailed`: deadline cleared, fail count preserved.
    fn set_jailed(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Unconditional terminal write (real-time ban/kick/leave paths):
    /// sets the status, clears the deadline, upserting if needed.
    fn set_terminal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        status: VerificationStatus,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Mark `Kicked` with the given fail count, only if still `Pending`.
    /// Returns whether the write applied.
    fn mark_kicked(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        fail_count: u32,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Mark `Banned` with the given fail count, only if still `Pending`.
    fn mark_banned(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        fail_count: u32,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Mark `Left`, only if still `Pending`.
    fn mark_left(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Push a pending deadline forward (transient-error deferral).
    fn defer_deadline(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        next_deadline_at: Timestamp,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Reset the fail counter to zero without touching status or
    /// deadline. Returns whether anything changed.
    fn reset_fails(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<bool, StoreError>;
}
