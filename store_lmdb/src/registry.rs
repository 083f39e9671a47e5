//! LMDB implementation of the protected-identity registry.

use std::ops::Bound;

use warden_store::registry::{ProtectedAlias, ProtectedIdentity, RegistryStore};
use warden_store::StoreError;
use warden_types::{GroupId, PrincipalId, Timestamp};

use crate::keys::{alias_key, group_prefix, increment_prefix, principal_key};
use crate::{LmdbError, LmdbStore};

impl LmdbStore {
    fn read_identity(
        &self,
        txn: &heed::RoTxn,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<ProtectedIdentity>, LmdbError> {
        let key = principal_key(group, principal);
        match self.identities_db.get(txn, &key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, LmdbError> {
        let prefix = group_prefix(group);
        let mut upper = prefix.clone();
        increment_prefix(&mut upper);

        let rtxn = self.env.read_txn()?;
        let bounds = (
            Bound::Included(prefix.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self.identities_db.range(&rtxn, &bounds)?;
        let mut identities = Vec::new();
        for result in iter {
            let (_, value) = result?;
            identities.push(bincode::deserialize(value)?);
        }
        Ok(identities)
    }
}

impl RegistryStore for LmdbStore {
    fn upsert_identity(
        &self,
        group: &GroupId,
        identity: ProtectedIdentity,
    ) -> Result<(), StoreError> {
        let key = principal_key(group, &identity.principal_id);
        let bytes = bincode::serialize(&identity).map_err(LmdbError::from)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.identities_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_identity(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Option<ProtectedIdentity>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .read_identity(&rtxn, group, principal)
            .map_err(LmdbError::from)?)
    }

    fn list_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, StoreError> {
        let mut identities = self.scan_identities(group).map_err(LmdbError::from)?;
        identities.sort_by_key(|i| !i.active);
        Ok(identities)
    }

    fn active_identities(&self, group: &GroupId) -> Result<Vec<ProtectedIdentity>, StoreError> {
        let mut identities = self.scan_identities(group).map_err(LmdbError::from)?;
        identities.retain(|i| i.active);
        Ok(identities)
    }

    fn is_active_identity(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .read_identity(&rtxn, group, principal)
            .map_err(LmdbError::from)?
            .is_some_and(|i| i.active))
    }

    fn update_identity_name(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        current_name: Option<String>,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        match self
            .read_identity(&wtxn, group, principal)
            .map_err(LmdbError::from)?
        {
            Some(mut identity) => {
                identity.current_name = current_name;
                identity.updated_at = at;
                let key = principal_key(group, principal);
                let bytes = bincode::serialize(&identity).map_err(LmdbError::from)?;
                self.identities_db
                    .put(&mut wtxn, &key, &bytes)
                    .map_err(LmdbError::from)?;
                wtxn.commit().map_err(LmdbError::from)?;
            }
            None => wtxn.abort(),
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
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        match self
            .read_identity(&wtxn, group, principal)
            .map_err(LmdbError::from)?
        {
            Some(mut identity) => {
                identity.active = active;
                identity.updated_at = at;
                let key = principal_key(group, principal);
                let bytes = bincode::serialize(&identity).map_err(LmdbError::from)?;
                self.identities_db
                    .put(&mut wtxn, &key, &bytes)
                    .map_err(LmdbError::from)?;
                wtxn.commit().map_err(LmdbError::from)?;
                Ok(true)
            }
            None => {
                wtxn.abort();
                Ok(false)
            }
        }
    }

    fn upsert_alias(&self, group: &GroupId, alias: ProtectedAlias) -> Result<(), StoreError> {
        let key = alias_key(group, &alias.principal_id, &alias.alias_name);
        let bytes = bincode::serialize(&alias).map_err(LmdbError::from)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.aliases_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn active_aliases(&self, group: &GroupId) -> Result<Vec<ProtectedAlias>, StoreError> {
        let prefix = group_prefix(group);
        let mut upper = prefix.clone();
        increment_prefix(&mut upper);

        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(prefix.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .aliases_db
            .range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut aliases = Vec::new();
        for result in iter {
            let (_, value) = result.map_err(LmdbError::from)?;
            let alias: ProtectedAlias = bincode::deserialize(value).map_err(LmdbError::from)?;
            if alias.active {
                aliases.push(alias);
            }
        }
        Ok(aliases)
    }
}
