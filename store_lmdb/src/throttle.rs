//! LMDB implementation of the alert-throttle table.
//!
//! Values are raw big-endian u64 millisecond timestamps.

use std::ops::Bound;

use warden_store::throttle::ThrottleStore;
use warden_store::StoreError;
use warden_types::{GroupId, Timestamp};

use crate::keys::{group_prefix, increment_prefix, throttle_key};
use crate::{LmdbError, LmdbStore};

fn decode_timestamp(bytes: &[u8]) -> Result<Timestamp, LmdbError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Serialization("throttle value is not 8 bytes".into()))?;
    Ok(Timestamp::new(u64::from_be_bytes(raw)))
}

impl ThrottleStore for LmdbStore {
    fn get_throttle(&self, group: &GroupId, key: &str) -> Result<Option<Timestamp>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .throttle_db
            .get(&rtxn, &throttle_key(group, key))
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(decode_timestamp(bytes)?)),
            None => Ok(None),
        }
    }

    fn set_throttle(&self, group: &GroupId, key: &str, at: Timestamp) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.throttle_db
            .put(
                &mut wtxn,
                &throttle_key(group, key),
                &at.as_millis().to_be_bytes(),
            )
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn throttles_with_prefix(
        &self,
        group: &GroupId,
        prefix: &str,
    ) -> Result<Vec<(String, Timestamp)>, StoreError> {
        let key_prefix = throttle_key(group, prefix);
        let mut upper = key_prefix.clone();
        increment_prefix(&mut upper);
        let tail_offset = group_prefix(group).len();

        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(key_prefix.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .throttle_db
            .range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut throttles = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(LmdbError::from)?;
            let issue_key = String::from_utf8(key[tail_offset..].to_vec())
                .map_err(|e| LmdbError::Serialization(e.to_string()))?;
            throttles.push((issue_key, decode_timestamp(value)?));
        }
        Ok(throttles)
    }

    fn delete_throttle(&self, group: &GroupId, key: &str) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.throttle_db
            .delete(&mut wtxn, &throttle_key(group, key))
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
