//! LMDB storage backend for the warden admission gate.
//!
//! Implements all storage traits from `warden-store` using the `heed`
//! LMDB bindings. One environment, one named database per logical table,
//! bincode-encoded values. Write transactions are exclusive in LMDB, so
//! the status-preconditioned writes (read record, check status, write)
//! are atomic as long as they run inside a single write transaction —
//! which every mutation here does.

pub mod error;
pub mod keys;
pub mod moderation;
pub mod registry;
pub mod throttle;
pub mod verification;

use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

pub use error::LmdbError;

/// Default LMDB map size: 256 MiB. The gate's tables are small; bump via
/// [`LmdbStore::open_with_map_size`] for very large communities.
const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;
/// Number of named LMDB databases.
const MAX_DBS: u32 = 6;

/// LMDB-backed implementation of every `warden-store` trait.
pub struct LmdbStore {
    pub(crate) env: Arc<Env>,
    /// `(group, principal) -> VerificationRecord`
    pub(crate) records_db: Database<Bytes, Bytes>,
    /// `(group, deadline_at, principal) -> ()` — index for the due scan.
    pub(crate) deadline_db: Database<Bytes, Bytes>,
    /// `(group, timestamp, seq) -> ModerationLogEntry`
    pub(crate) log_db: Database<Bytes, Bytes>,
    /// `(group, principal) -> ProtectedIdentity`
    pub(crate) identities_db: Database<Bytes, Bytes>,
    /// `(group, principal, alias_name) -> ProtectedAlias`
    pub(crate) aliases_db: Database<Bytes, Bytes>,
    /// `(group, issue_key) -> last_sent_at`
    pub(crate) throttle_db: Database<Bytes, Bytes>,
    /// Disambiguates log entries written within the same millisecond.
    pub(crate) log_seq: AtomicU64,
}

impl LmdbStore {
    /// Open or create the store at `path` with the default map size.
    pub fn open(path: &Path) -> Result<Self, LmdbError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create data dir: {e}")))?;

        // The process opens each environment exactly once (owned by the
        // single LmdbStore), which is what makes this sound.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let records_db = env.create_database(&mut wtxn, Some("verification_records"))?;
        let deadline_db = env.create_database(&mut wtxn, Some("deadline_index"))?;
        let log_db = env.create_database(&mut wtxn, Some("moderation_log"))?;
        let identities_db = env.create_database(&mut wtxn, Some("protected_identities"))?;
        let aliases_db = env.create_database(&mut wtxn, Some("protected_aliases"))?;
        let throttle_db = env.create_database(&mut wtxn, Some("alert_throttle"))?;
        wtxn.commit()?;

        Ok(Self {
            env: Arc::new(env),
            records_db,
            deadline_db,
            log_db,
            identities_db,
            aliases_db,
            throttle_db,
            log_seq: AtomicU64::new(0),
        })
    }
}
