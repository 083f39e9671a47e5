//! Protected-identity registry storage trait.

use serde::{Deserialize, Serialize};
use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::StoreError;

/// A principal registered as authoritative for its display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedIdentity {
    pub principal_id: PrincipalId,
    /// Last known display name, refreshed by the registry health sweep.
    pub current_name: Option<String>,
    pub active: bool,
    pub added_by: Option<PrincipalId>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An additional protected string tied to a registered principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedAlias {
    pub principal_id: PrincipalId,
    pub alias_name: String,
    pub active: bool,
}

/// Trait for the protected-identity registry.
pub trait RegistryStore {
    /// Insert or replace an identity row.
    fn upsert_identity(
        &self,
        group: &GroupId,
        identity: ProtectedIdentity,
    ) -> Result<(), StoreError>;

    fn get_identity(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<ProtectedIdentity>, StoreError>;

    /// All identity rows in the group, active first.
    fn list_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, StoreError>;

    /// Active identity rows only.
    fn active_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, StoreError>;

    /// Whether the principal has an active identity row.
    fn is_active_identity(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<bool, StoreError>;

    /// Update the cached display name; no-op if the row is missing.
    fn update_identity_name(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        current_name: Option<String>,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Activate or deactivate an identity. Returns whether a row existed.
    fn set_identity_active(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        active: bool,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Insert or replace an alias row, keyed by (principal, alias name).
    fn upsert_alias(&self, group: &GroupId, alias: ProtectedAlias) -> Result<(), StoreError>;

    /// Active alias rows in the group.
    fn active_aliases(&self, group: &GroupId) -> Result<Vec<ProtectedAlias>, StoreError>;
}
