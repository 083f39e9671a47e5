//! LMDB implementation of the append-only moderation log.

use std::ops::Bound;
use std::sync::atomic::Ordering;

use warden_store::moderation::{ModerationLogEntry, ModerationLogStore};
use warden_store::StoreError;
use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::keys::{group_prefix, increment_prefix, log_key};
use crate::{LmdbError, LmdbStore};

impl ModerationLogStore for LmdbStore {
    fn append_log(&self, group: &GroupId, entry: ModerationLogEntry) -> Result<(), StoreError> {
        // Entries within the same millisecond get distinct keys via the
        // process-local sequence counter.
        let seq = self.log_seq.fetch_add(1, Ordering::Relaxed);
        let key = log_key(group, entry.timestamp, seq);
        let bytes = bincode::serialize(&entry).map_err(LmdbError::from)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.log_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn log_for_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Vec<ModerationLogEntry>, StoreError> {
        let prefix = group_prefix(group);
        let mut upper = prefix.clone();
        increment_prefix(&mut upper);

        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(prefix.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self.log_db.range(&rtxn, &bounds).map_err(LmdbError::from)?;

        // Keys sort by (timestamp, seq), so the scan yields oldest first.
        let mut entries = Vec::new();
        for result in iter {
            let (_, value) = result.map_err(LmdbError::from)?;
            let entry: ModerationLogEntry =
                bincode::deserialize(value).map_err(LmdbError::from)?;
            if &entry.principal_id == principal {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn trim_log_before(&self, group: &GroupId, cutoff: Timestamp) -> Result<u64, StoreError> {
        let prefix = group_prefix(group);
        let mut upper = prefix.clone();
        upper.extend_from_slice(&cutoff.as_millis().to_be_bytes());

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let stale: Vec<Vec<u8>> = {
            let bounds = (
                Bound::Included(prefix.as_slice()),
                Bound::Excluded(upper.as_slice()),
            );
            let iter = self.log_db.range(&wtxn, &bounds).map_err(LmdbError::from)?;
            let mut keys = Vec::new();
            for result in iter {
                let (key, _) = result.map_err(LmdbError::from)?;
                keys.push(key.to_vec());
            }
            keys
        };

        let removed = stale.len() as u64;
        for key in &stale {
            self.log_db
                .delete(&mut wtxn, key)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(removed)
    }
}
