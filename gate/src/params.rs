//! Gate tuning parameters.

use warden_types::{GroupId, PrincipalId, TagId};

/// Real-time finalizations suppress the poller for this long, bridging
/// the gap until the store write is visible to the next due scan.
pub const DEFAULT_SUPPRESSION_MS: u64 = 120_000;

/// Minimum gap between repeated alerts for the same registry issue.
pub const DEFAULT_ALERT_THROTTLE_MS: u64 = 4 * 60 * 60 * 1000;

pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 10 * 60 * 1000;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60 * 1000;

/// Everything the gate needs to know about one monitored group.
#[derive(Clone, Debug)]
pub struct GateParams {
    pub group: GroupId,
    /// Tag marking a fully admitted principal.
    pub verified_tag: TagId,
    /// Tag marking a contained (jailed) principal.
    pub restricted_tag: TagId,
    /// Tag granted on join while verification is pending.
    pub provisional_tag: TagId,
    /// Managed tag applied to bot accounts instead of probation.
    pub automata_tag: TagId,
    /// Tags whose holders are covered by the registry health sweep and
    /// exempt from the impersonation check.
    pub protected_tags: Vec<TagId>,
    /// Principal ids exempt from the impersonation check outright.
    pub protected_principals: Vec<PrincipalId>,
    pub verify_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub suppression_ms: u64,
    pub alert_throttle_ms: u64,
}

impl GateParams {
    pub fn new(
        group: GroupId,
        verified_tag: TagId,
        restricted_tag: TagId,
        provisional_tag: TagId,
        automata_tag: TagId,
    ) -> Self {
        Self {
            group,
            verified_tag,
            restricted_tag,
            provisional_tag,
            automata_tag,
            protected_tags: Vec::new(),
            protected_principals: Vec::new(),
            verify_timeout_ms: DEFAULT_VERIFY_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            suppression_ms: DEFAULT_SUPPRESSION_MS,
            alert_throttle_ms: DEFAULT_ALERT_THROTTLE_MS,
        }
    }
}
