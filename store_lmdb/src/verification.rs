//! LMDB implementation of VerificationStore.
//!
//! The deadline index maps `(group, deadline_at, principal)` to an empty
//! value and is kept in step with the records table inside the same
//! write transaction, so the due scan never observes a half-updated row.

use std::ops::Bound;

use heed::RwTxn;

use warden_store::verification::{VerificationRecord, VerificationStatus, VerificationStore};
use warden_store::StoreError;
use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::keys::{deadline_key, group_prefix, increment_prefix, principal_key};
use crate::{LmdbError, LmdbStore};

impl LmdbStore {
    fn read_record(
        &self,
        txn: &heed::RoTxn,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<VerificationRecord>, LmdbError> {
        let key = principal_key(group, principal);
        match self.records_db.get(txn, &key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a record and reconcile the deadline index against the
    /// previous version of the row.
    fn write_record(
        &self,
        wtxn: &mut RwTxn,
        group: &GroupId,
        old: Option<&VerificationRecord>,
        new: &VerificationRecord,
    ) -> Result<(), LmdbError> {
        let key = principal_key(group, &new.principal_id);
        let bytes = bincode::serialize(new)?;
        self.records_db.put(wtxn, &key, &bytes)?;

        if let Some(old_deadline) = old.and_then(|r| r.deadline_at) {
            if new.deadline_at != Some(old_deadline) {
                self.deadline_db
                    .delete(wtxn, &deadline_key(group, old_deadline, &new.principal_id))?;
            }
        }
        if let Some(deadline) = new.deadline_at {
            self.deadline_db
                .put(wtxn, &deadline_key(group, deadline, &new.principal_id), &[])?;
        }
        Ok(())
    }

    fn mark_if_pending(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        status: VerificationStatus,
        fail_count: Option<u32>,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let old = self.read_record(&wtxn, group, principal).map_err(LmdbError::from)?;
        let Some(record) = old else {
            wtxn.abort();
            return Ok(false);
        };
        if record.status != VerificationStatus::Pending {
            wtxn.abort();
            return Ok(false);
        }

        let mut updated = record.clone();
        updated.status = status;
        updated.deadline_at = None;
        if let Some(f) = fail_count {
            updated.fail_count = f;
        }
        updated.last_action_at = at;

        self.write_record(&mut wtxn, group, Some(&record), &updated)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn upsert_with(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
        apply: impl FnOnce(&mut VerificationRecord),
    ) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let old = self.read_record(&wtxn, group, principal).map_err(LmdbError::from)?;
        let mut record = old.clone().unwrap_or(VerificationRecord {
            principal_id: principal.clone(),
            fail_count: 0,
            joined_at: at,
            deadline_at: None,
            status: VerificationStatus::Pending,
            last_action_at: at,
        });
        apply(&mut record);
        record.last_action_at = at;
        self.write_record(&mut wtxn, group, old.as_ref(), &record)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

impl VerificationStore for LmdbStore {
    fn upsert_pending(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        joined_at: Timestamp,
        deadline_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.upsert_with(group, principal, joined_at, |record| {
            record.joined_at = joined_at;
            record.deadline_at = Some(deadline_at);
            record.status = VerificationStatus::Pending;
        })
    }

    fn get_record(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .read_record(&rtxn, group, principal)
            .map_err(LmdbError::from)?)
    }

    fn due_pending(
        &self,
        group: &GroupId,
        now: Timestamp,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        let prefix = group_prefix(group);
        // Upper bound: everything with deadline <= now. The deadline key
        // embeds be64(deadline) right after the group prefix, so the
        // bound is prefix ++ be64(now + 1).
        let mut upper = prefix.clone();
        upper.extend_from_slice(&now.as_millis().saturating_add(1).to_be_bytes());

        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(prefix.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .deadline_db
            .range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;

        let mut due = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(LmdbError::from)?;
            // key = group ++ 0x00 ++ be64 ++ 0x00 ++ principal
            let tail = &key[prefix.len() + 8 + 1..];
            let principal = PrincipalId::new(
                String::from_utf8(tail.to_vec())
                    .map_err(|e| LmdbError::Serialization(e.to_string()))?,
            );
            if let Some(record) = self
                .read_record(&rtxn, group, &principal)
                .map_err(LmdbError::from)?
            {
                // The index can briefly trail the records table only
                // within a transaction; here both reads share the txn.
                if record.status == VerificationStatus::Pending
                    && record.deadline_at.is_some_and(|d| d <= now)
                {
                    due.push(record);
                }
            }
        }
        Ok(due)
    }

    fn pending_count(&self, group: &GroupId) -> Result<u64, StoreError> {
        let prefix = group_prefix(group);
        let mut upper = prefix.clone();
        increment_prefix(&mut upper);

        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(prefix.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .deadline_db
            .range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut count = 0u64;
        for result in iter {
            result.map_err(LmdbError::from)?;
            count += 1;
        }
        Ok(count)
    }

    fn set_verified(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.upsert_with(group, principal, at, |record| {
            record.status = VerificationStatus::Verified;
            record.fail_count = 0;
            record.deadline_at = None;
        })
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
        self.upsert_with(group, principal, at, |record| {
            record.status = status;
            record.deadline_at = None;
        })
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
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let old = self.read_record(&wtxn, group, principal).map_err(LmdbError::from)?;
        match old {
            Some(record) if record.status == VerificationStatus::Pending => {
                let mut updated = record.clone();
                updated.deadline_at = Some(next_deadline_at);
                updated.last_action_at = at;
                self.write_record(&mut wtxn, group, Some(&record), &updated)
                    .map_err(LmdbError::from)?;
                wtxn.commit().map_err(LmdbError::from)?;
            }
            _ => wtxn.abort(),
        }
        Ok(())
    }

    fn reset_fails(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let old = self.read_record(&wtxn, group, principal).map_err(LmdbError::from)?;
        match old {
            Some(record) if record.fail_count != 0 => {
                let mut updated = record.clone();
                updated.fail_count = 0;
                updated.last_action_at = at;
                self.write_record(&mut wtxn, group, Some(&record), &updated)
                    .map_err(LmdbError::from)?;
                wtxn.commit().map_err(LmdbError::from)?;
                Ok(true)
            }
            _ => {
                wtxn.abort();
                Ok(false)
            }
        }
    }
}
