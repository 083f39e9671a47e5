//! In-memory store backend.
//!
//! Backs unit and integration tests; every operation takes the single
//! interior mutex, which trivially gives the atomic read-modify-write
//! the trait contract demands.

use std::collections::BTreeMap;
use std::sync::Mutex;

use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::moderation::{ModerationLogEntry, ModerationLogStore};
use crate::registry::{ProtectedAlias, ProtectedIdentity, RegistryStore};
use crate::throttle::ThrottleStore;
use crate::verification::{VerificationRecord, VerificationStatus, VerificationStore};
use crate::StoreError;

type Key = (String, String);

#[derive(Default)]
struct Inner {
    records: BTreeMap<Key, VerificationRecord>,
    logs: Vec<(String, ModerationLogEntry)>,
    identities: BTreeMap<Key, ProtectedIdentity>,
    aliases: BTreeMap<(String, String, String), ProtectedAlias>,
    throttles: BTreeMap<Key, Timestamp>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(group: &GroupId, principal: &PrincipalId) -> Key {
    (group.as_str().to_string(), principal.as_str().to_string())
}

impl VerificationStore for MemoryStore {
    fn upsert_pending(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        joined_at: Timestamp,
        deadline_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let fail_count = inner
            .records
            .get(&key(group, principal))
            .map(|r| r.fail_count)
            .unwrap_or(0);
        inner.records.insert(
            key(group, principal),
            VerificationRecord {
                principal_id: principal.clone(),
                fail_count,
                joined_at,
                deadline_at: Some(deadline_at),
                status: VerificationStatus::Pending,
                last_action_at: joined_at,
            },
        );
        Ok(())
    }

    fn get_record(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.get(&key(group, principal)).cloned())
    }

    fn due_pending(
        &self,
        group: &GroupId,
        now: Timestamp,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<VerificationRecord> = inner
            .records
            .iter()
            .filter(|((g, _), r)| {
                g == group.as_str()
                    && r.status == VerificationStatus::Pending
                    && r.deadline_at.is_some_and(|d| d <= now)
            })
            .map(|(_, r)| r.clone())
            .collect();
        due.sort_by_key(|r| r.deadline_at);
        Ok(due)
    }

    fn pending_count(&self, group: &GroupId) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|((g, _), r)| g == group.as_str() && r.status == VerificationStatus::Pending)
            .count() as u64)
    }

    fn set_verified(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .entry(key(group, principal))
            .or_insert_with(|| VerificationRecord {
                principal_id: principal.clone(),
                fail_count: 0,
                joined_at: at,
                deadline_at: None,
                status: VerificationStatus::Verified,
                last_action_at: at,
            });
        record.status = VerificationStatus::Verified;
        record.fail_count = 0;
        record.deadline_at = None;
        record.last_action_at = at;
        Ok(())
    }

    fn set_jailed(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.set_terminal(group, principal, VerificationStatus::Jailed, at)
    }

    fn set_terminal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        status: VerificationStatus,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .entry(key(group, principal))
            .or_insert_with(|| VerificationRecord {
                principal_id: principal.clone(),
                fail_count: 0,
                joined_at: at,
                deadline_at: None,
                status,
                last_action_at: at,
            });
        record.status = status;
        record.deadline_at = None;
        record.last_action_at = at;
        Ok(())
    }

    fn mark_kicked(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        fail_count: u32,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.mark_if_pending(group, principal, VerificationStatus::Kicked, Some(fail_count), at)
    }

    fn mark_banned(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        fail_count: u32,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.mark_if_pending(group, principal, VerificationStatus::Banned, Some(fail_count), at)
    }

    fn mark_left(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.mark_if_pending(group, principal, VerificationStatus::Left, None, at)
    }

    fn defer_deadline(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        next_deadline_at: Timestamp,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.records.get_mut(&key(group, principal)) {
            if record.status == VerificationStatus::Pending {
                record.deadline_at = Some(next_deadline_at);
                record.last_action_at = at;
            }
        }
        Ok(())
    }

    fn reset_fails(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.records.get_mut(&key(group, principal)) {
            Some(record) if record.fail_count != 0 => {
                record.fail_count = 0;
                record.last_action_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl MemoryStore {
    fn mark_if_pending(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        status: VerificationStatus,
        fail_count: Option<u32>,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.records.get_mut(&key(group, principal)) {
            Some(record) if record.status == VerificationStatus::Pending => {
                record.status = status;
                record.deadline_at = None;
                if let Some(f) = fail_count {
                    record.fail_count = f;
                }
                record.last_action_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl ModerationLogStore for MemoryStore {
    fn append_log(&self, group: &GroupId, entry: ModerationLogEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.logs.push((group.as_str().to_string(), entry));
        Ok(())
    }

    fn log_for_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Vec<ModerationLogEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .logs
            .iter()
            .filter(|(g, e)| g == group.as_str() && &e.principal_id == principal)
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn trim_log_before(&self, group: &GroupId, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.logs.len();
        inner
            .logs
            .retain(|(g, e)| g != group.as_str() || e.timestamp >= cutoff);
        Ok((before - inner.logs.len()) as u64)
    }
}

impl RegistryStore for MemoryStore {
    fn upsert_identity(
        &self,
        group: &GroupId,
        identity: ProtectedIdentity,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .identities
            .insert(key(group, &identity.principal_id), identity);
        Ok(())
    }

    fn get_identity(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<ProtectedIdentity>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.identities.get(&key(group, principal)).cloned())
    }

    fn list_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ProtectedIdentity> = inner
            .identities
            .iter()
            .filter(|((g, _), _)| g == group.as_str())
            .map(|(_, v)| v.clone())
            .collect();
        rows.sort_by_key(|r| (!r.active, std::cmp::Reverse(r.updated_at)));
        Ok(rows)
    }

    fn active_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, StoreError> {
        Ok(self
            .list_identities(group)?
            .into_iter()
            .filter(|r| r.active)
            .collect())
    }

    fn is_active_identity(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .identities
            .get(&key(group, principal))
            .is_some_and(|r| r.active))
    }

    fn update_identity_name(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        current_name: Option<String>,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.identities.get_mut(&key(group, principal)) {
            row.current_name = current_name;
            row.updated_at = at;
        }
        Ok(())
    }

    fn set_identity_active(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        active: bool,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.identities.get_mut(&key(group, principal)) {
            Some(row) => {
                row.active = active;
                row.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn upsert_alias(&self, group: &GroupId, alias: ProtectedAlias) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.aliases.insert(
            (
                group.as_str().to_string(),
                alias.principal_id.as_str().to_string(),
                alias.alias_name.clone(),
            ),
            alias,
        );
        Ok(())
    }

    fn active_aliases(&self, group: &GroupId) -> Result<Vec<ProtectedAlias>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .aliases
            .iter()
            .filter(|((g, _, _), a)| g == group.as_str() && a.active)
            .map(|(_, a)| a.clone())
            .collect())
    }
}

impl ThrottleStore for MemoryStore {
    fn get_throttle(&self, group: &GroupId, key: &str) -> Result<Option<Timestamp>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .throttles
            .get(&(group.as_str().to_string(), key.to_string()))
            .copied())
    }

    fn set_throttle(&self, group: &GroupId, key: &str, at: Timestamp) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .throttles
            .insert((group.as_str().to_string(), key.to_string()), at);
        Ok(())
    }

    fn throttles_with_prefix(
        &self,
        group: &GroupId,
        prefix: &str,
    ) -> Result<Vec<(String, Timestamp)>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .throttles
            .iter()
            .filter(|((g, k), _)| g == group.as_str() && k.starts_with(prefix))
            .map(|((_, k), t)| (k.clone(), *t))
            .collect())
    }

    fn delete_throttle(&self, group: &GroupId, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .throttles
            .remove(&(group.as_str().to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    fn pid(s: &str) -> PrincipalId {
        PrincipalId::new(s)
    }

    fn ts(ms: u64) -> Timestamp {
        Timestamp::new(ms)
    }

    #[test]
    fn upsert_pending_preserves_fail_count() {
        let store = MemoryStore::new();
        store.upsert_pending(&group(), &pid("1"), ts(10), ts(100)).unwrap();
        assert!(store.mark_kicked(&group(), &pid("1"), 1, ts(100)).unwrap());

        // Rejoin re-opens the window without resetting the counter.
        store.upsert_pending(&group(), &pid("1"), ts(200), ts(300)).unwrap();
        let record = store.get_record(&group(), &pid("1")).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Pending);
        assert_eq!(record.fail_count, 1);
        assert!(record.invariant_holds());
    }

    #[test]
    fn mark_kicked_requires_pending() {
        let store = MemoryStore::new();
        store.upsert_pending(&group(), &pid("1"), ts(10), ts(100)).unwrap();
        store.set_verified(&group(), &pid("1"), ts(50)).unwrap();

        assert!(!store.mark_kicked(&group(), &pid("1"), 1, ts(100)).unwrap());
        let record = store.get_record(&group(), &pid("1")).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Verified);
    }

    #[test]
    fn due_pending_is_ordered_and_filtered() {
        let store = MemoryStore::new();
        store.upsert_pending(&group(), &pid("late"), ts(0), ts(200)).unwrap();
        store.upsert_pending(&group(), &pid("early"), ts(0), ts(100)).unwrap();
        store.upsert_pending(&group(), &pid("future"), ts(0), ts(900)).unwrap();

        let due = store.due_pending(&group(), ts(250)).unwrap();
        let ids: Vec<&str> = due.iter().map(|r| r.principal_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn every_transition_maintains_deadline_invariant() {
        let store = MemoryStore::new();
        let g = group();
        store.upsert_pending(&g, &pid("1"), ts(0), ts(100)).unwrap();
        store.set_jailed(&g, &pid("1"), ts(1)).unwrap();
        assert!(store.get_record(&g, &pid("1")).unwrap().unwrap().invariant_holds());

        store.upsert_pending(&g, &pid("2"), ts(0), ts(100)).unwrap();
        store.set_verified(&g, &pid("2"), ts(1)).unwrap();
        assert!(store.get_record(&g, &pid("2")).unwrap().unwrap().invariant_holds());

        store.upsert_pending(&g, &pid("3"), ts(0), ts(100)).unwrap();
        store.mark_left(&g, &pid("3"), ts(101)).unwrap();
        assert!(store.get_record(&g, &pid("3")).unwrap().unwrap().invariant_holds());

        store
            .set_terminal(&g, &pid("4"), VerificationStatus::Banned, ts(5))
            .unwrap();
        assert!(store.get_record(&g, &pid("4")).unwrap().unwrap().invariant_holds());
    }

    #[test]
    fn defer_only_moves_pending_deadlines() {
        let store = MemoryStore::new();
        store.upsert_pending(&group(), &pid("1"), ts(0), ts(100)).unwrap();
        store.defer_deadline(&group(), &pid("1"), ts(500), ts(100)).unwrap();
        let record = store.get_record(&group(), &pid("1")).unwrap().unwrap();
        assert_eq!(record.deadline_at, Some(ts(500)));

        store.set_verified(&group(), &pid("1"), ts(200)).unwrap();
        store.defer_deadline(&group(), &pid("1"), ts(900), ts(200)).unwrap();
        let record = store.get_record(&group(), &pid("1")).unwrap().unwrap();
        assert_eq!(record.deadline_at, None);
    }

    #[test]
    fn reset_fails_reports_change() {
        let store = MemoryStore::new();
        store.upsert_pending(&group(), &pid("1"), ts(0), ts(100)).unwrap();
        assert!(!store.reset_fails(&group(), &pid("1"), ts(10)).unwrap());

        store.mark_kicked(&group(), &pid("1"), 1, ts(100)).unwrap();
        assert!(store.reset_fails(&group(), &pid("1"), ts(200)).unwrap());
        assert!(!store.reset_fails(&group(), &pid("1"), ts(300)).unwrap());
    }

    #[test]
    fn throttle_prefix_listing_and_delete() {
        let store = MemoryStore::new();
        let g = group();
        store.set_throttle(&g, "missing:1", ts(10)).unwrap();
        store.set_throttle(&g, "missing:2", ts(20)).unwrap();
        store.set_throttle(&g, "duplicate:alice", ts(30)).unwrap();

        let missing = store.throttles_with_prefix(&g, "missing:").unwrap();
        assert_eq!(missing.len(), 2);

        store.delete_throttle(&g, "missing:1").unwrap();
        assert_eq!(store.get_throttle(&g, "missing:1").unwrap(), None);
        assert_eq!(store.get_throttle(&g, "missing:2").unwrap(), Some(ts(20)));
    }

    #[test]
    fn log_trim_removes_only_old_entries() {
        let store = MemoryStore::new();
        let g = group();
        store
            .append_log(&g, ModerationLogEntry::new(pid("1"), "join", crate::LogOutcome::Success, ts(10)))
            .unwrap();
        store
            .append_log(&g, ModerationLogEntry::new(pid("1"), "verified", crate::LogOutcome::Success, ts(500)))
            .unwrap();

        let removed = store.trim_log_before(&g, ts(100)).unwrap();
        assert_eq!(removed, 1);
        let remaining = store.log_for_principal(&g, &pid("1")).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].action, "verified");
    }
}
