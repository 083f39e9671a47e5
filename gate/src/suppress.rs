//! Short-lived per-principal suppression of the reconciliation poller.
//!
//! Real-time paths that finalize a record (verification, kick, ban,
//! leave) set a window here so the next poll doesn't act on the same
//! principal from a stale due scan. Windows expire on their own and are
//! never cleared early. In-memory only; a restart simply loses them,
//! which is safe because the store preconditions still hold.

use std::collections::HashMap;
use std::sync::Mutex;

use warden_types::{PrincipalId, Timestamp};

pub struct SuppressionWindow {
    window_ms: u64,
    expiries: Mutex<HashMap<PrincipalId, Timestamp>>,
}

impl SuppressionWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            expiries: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or extend) the window for a principal.
    pub fn suppress(&self, principal: &PrincipalId, now: Timestamp) {
        self.expiries
            .lock()
            .unwrap()
            .insert(principal.clone(), now.plus_millis(self.window_ms));
    }

    pub fn is_suppressed(&self, principal: &PrincipalId, now: Timestamp) -> bool {
        let mut expiries = self.expiries.lock().unwrap();
        match expiries.get(principal) {
            Some(expiry) if *expiry > now => true,
            Some(_) => {
                expiries.remove(principal);
                false
            }
            None => false,
        }
    }

    /// Drop every expired window. Called once per poll cycle so the map
    /// stays bounded by recent activity.
    pub fn prune(&self, now: Timestamp) {
        self.expiries.lock().unwrap().retain(|_, expiry| *expiry > now);
    }
}
