//! Alert-throttle storage trait.
//!
//! Keys are opaque issue identifiers (e.g. `missing:<principal_id>`,
//! `duplicate:<normalized_name>`). The registry health sweep reads the
//! keys under a prefix to find issues that stopped being reported, which
//! is how "resolved" notifications are produced.

use warden_types::{GroupId, Timestamp};

use crate::StoreError;

pub trait ThrottleStore {
    /// When an alert for this key was last sent, if ever.
    fn get_throttle(&self, group: &GroupId, key: &str) -> Result<Option<Timestamp>, StoreError>;

    /// Stamp the key with a send time.
    fn set_throttle(&self, group: &GroupId, key: &str, at: Timestamp) -> Result<(), StoreError>;

    /// All throttle keys starting with `prefix`, with their timestamps.
    fn throttles_with_prefix(
        &self,
        group: &GroupId,
        prefix: &str,
    ) -> Result<Vec<(String, Timestamp)>, StoreError>;

    /// Remove a key (issue resolved).
    fn delete_throttle(&self, group: &GroupId, key: &str) -> Result<(), StoreError>;
}
