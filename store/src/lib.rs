//! Abstract storage traits for the warden admission gate.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits. Backends
//! must provide atomic upserts, and the status-preconditioned writes on
//! [`VerificationStore`] must be atomic read-modify-write so the event
//! handlers and the reconciliation loop cannot race past a stale read.

pub mod error;
pub mod memory;
pub mod moderation;
pub mod registry;
pub mod throttle;
pub mod verification;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use moderation::{LogOutcome, ModerationLogEntry, ModerationLogStore};
pub use registry::{ProtectedAlias, ProtectedIdentity, RegistryStore};
pub use throttle::ThrottleStore;
pub use verification::{VerificationRecord, VerificationStatus, VerificationStore};

/// Convenience supertrait for code that needs the whole store surface.
pub trait Store:
    VerificationStore + ModerationLogStore + RegistryStore + ThrottleStore
{
}

impl<T> Store for T where
    T: VerificationStore + ModerationLogStore + RegistryStore + ThrottleStore
{
}
