//! Identity-collision detection.
//!
//! A candidate display name collides when its normalized form exactly
//! matches the normalized current name of an active protected identity,
//! or any active alias, owned by a different principal. Normalization is
//! trim + case-fold (`warden_types::normalize_name`); no fuzzy matching.

use std::collections::HashMap;

use warden_store::RegistryStore;
use warden_types::{normalize_name, GroupId, PrincipalId};

use crate::GateError;

/// Every active protected name, normalized, mapped to its owner.
pub fn protected_names<S: RegistryStore>(
    store: &S,
    group: &GroupId,
) -> Result<HashMap<String, PrincipalId>, GateError> {
    let mut names = HashMap::new();
    for identity in store.active_identities(group)? {
        if let Some(name) = &identity.current_name {
            let normalized = normalize_name(name);
            if !normalized.is_empty() {
                names.entry(normalized).or_insert(identity.principal_id.clone());
            }
        }
    }
    for alias in store.active_aliases(group)? {
        let normalized = normalize_name(&alias.alias_name);
        if !normalized.is_empty() {
            names.entry(normalized).or_insert(alias.principal_id.clone());
        }
    }
    Ok(names)
}

/// The protected principal whose name `candidate` collides with, if any.
/// A principal can never collide with its own registered names, and a
/// name that normalizes to empty never collides.
pub fn find_collision<S: RegistryStore>(
    store: &S,
    group: &GroupId,
    candidate: &str,
    principal: &PrincipalId,
) -> Result<Option<PrincipalId>, GateError> {
    let normalized = normalize_name(candidate);
    if normalized.is_empty() {
        return Ok(None);
    }
    match protected_names(store, group)?.get(&normalized) {
        Some(owner) if owner != principal => Ok(Some(owner.clone())),
        _ => Ok(None),
    }
}
