//! Deadline reconciliation cycle.
//!
//! The poller is the source of truth for expirations: event delivery is
//! best-effort, so every pass re-derives what to do from the store and
//! the live platform view. Each row is handled independently; one bad
//! principal never aborts the batch.

use tracing::{debug, info, warn};

use warden_platform::{Notification, Platform, RemovalSeverity};
use warden_store::{
    LogOutcome, Store, VerificationRecord, VerificationStatus, VerificationStore,
};
use warden_types::Timestamp;

use crate::gate::{VerificationGate, COLOR_ALERT, COLOR_WARNING};
use crate::GateError;

/// Counters for one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub scanned: u64,
    pub verified: u64,
    pub jailed: u64,
    pub left: u64,
    pub kicked: u64,
    pub banned: u64,
    pub deferred: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl<P: Platform, S: Store> VerificationGate<P, S> {
    /// Run one reconciliation pass over all due pending records.
    pub async fn run_reconcile_cycle(&self, now: Timestamp) -> Result<CycleStats, GateError> {
        let group = &self.params().group;
        let due = self.store().due_pending(group, now)?;
        let mut stats = CycleStats {
            scanned: due.len() as u64,
            ..CycleStats::default()
        };
        if !due.is_empty() {
            debug!(due = due.len(), "reconciling expired probation windows");
        }

        for record in due {
            if let Err(e) = self.reconcile_record(&record, now, &mut stats).await {
                stats.errors += 1;
                warn!(principal = %record.principal_id, error = %e, "reconcile step failed");
            }
        }
        self.suppression().prune(now);
        Ok(stats)
    }

    async fn reconcile_record(
        &self,
        record: &VerificationRecord,
        now: Timestamp,
        stats: &mut CycleStats,
    ) -> Result<(), GateError> {
        let group = &self.params().group;
        let principal = &record.principal_id;

        if self.suppression().is_suppressed(principal, now) {
            stats.skipped += 1;
            return Ok(());
        }

        // A real-time handler may have finalized the record after the
        // due scan; trust the store over the scan snapshot.
        let current = match self.store().get_record(group, principal)? {
            Some(r) if r.status == VerificationStatus::Pending => r,
            _ => {
                stats.skipped += 1;
                return Ok(());
            }
        };

        let live = match self.platform().fetch_principal(group, principal).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                if self.store().mark_left(group, principal, now)? {
                    self.log(
                        principal.clone(),
                        "leave",
                        LogOutcome::Closed,
                        now,
                        Some("not in group at deadline".into()),
                        None,
                    )?;
                    stats.left += 1;
                } else {
                    stats.skipped += 1;
                }
                return Ok(());
            }
            Err(e) => {
                self.log(
                    principal.clone(),
                    "verify_check",
                    LogOutcome::Error,
                    now,
                    None,
                    Some(e.to_string()),
                )?;
                self.defer(principal, now)?;
                stats.deferred += 1;
                return Ok(());
            }
        };

        // Tags the event stream missed resolve the row without action.
        if live.has_tag(&self.params().verified_tag) {
            self.store().set_verified(group, principal, now)?;
            self.log(
                principal.clone(),
                "verified",
                LogOutcome::Success,
                now,
                Some("tag observed at deadline".into()),
                None,
            )?;
            stats.verified += 1;
            return Ok(());
        }
        if live.has_tag(&self.params().restricted_tag) {
            self.store().set_jailed(group, principal, now)?;
            self.log(
                principal.clone(),
                "jailed",
                LogOutcome::Success,
                now,
                Some("tag observed at deadline".into()),
                None,
            )?;
            stats.jailed += 1;
            return Ok(());
        }

        self.escalate(&live.display_name, &current, now, stats).await
    }

    /// Remove an expired principal. First strike: soft removal, record
    /// `Kicked`, fail count becomes 1. Any later strike: hard removal
    /// with content purge, record `Banned`.
    async fn escalate(
        &self,
        display_name: &str,
        current: &VerificationRecord,
        now: Timestamp,
        stats: &mut CycleStats,
    ) -> Result<(), GateError> {
        let group = &self.params().group;
        let principal = &current.principal_id;
        let first_strike = current.fail_count == 0;
        let (severity, action, purge, reason) = if first_strike {
            (RemovalSeverity::Soft, "kick", false, "verification timeout")
        } else {
            (RemovalSeverity::Hard, "ban", true, "repeated verification timeout")
        };

        // Last look before the destructive call.
        let still_pending = self
            .store()
            .get_record(group, principal)?
            .is_some_and(|r| r.status == VerificationStatus::Pending);
        if !still_pending {
            self.log(principal.clone(), action, LogOutcome::Skipped, now, Some("record finalized during cycle".into()), None)?;
            stats.skipped += 1;
            return Ok(());
        }

        match self
            .platform()
            .remove_principal(group, principal, severity, reason, purge)
            .await
        {
            Ok(()) => {
                let applied = if first_strike {
                    self.store().mark_kicked(group, principal, 1, now)?
                } else {
                    self.store()
                        .mark_banned(group, principal, current.fail_count + 1, now)?
                };
                if !applied {
                    self.log(principal.clone(), action, LogOutcome::Skipped, now, Some("record finalized during removal".into()), None)?;
                    stats.skipped += 1;
                    return Ok(());
                }
                self.suppression().suppress(principal, now);
                self.log(principal.clone(), action, LogOutcome::Success, now, None, None)?;
                info!(principal = %principal, action, "expired principal removed");

                let (title, color, fails) = if first_strike {
                    ("Unverified member removed", COLOR_WARNING, 1)
                } else {
                    ("Unverified member banned", COLOR_ALERT, current.fail_count + 1)
                };
                self.notify(
                    Notification::new(title, reason, color)
                        .field("Member", display_name, true)
                        .field("ID", principal.as_str(), true)
                        .field("Failures", fails.to_string(), true),
                )
                .await;
                if first_strike {
                    stats.kicked += 1;
                } else {
                    stats.banned += 1;
                }
            }
            Err(e) => {
                warn!(principal = %principal, error = %e, "removal failed");
                self.log(principal.clone(), action, LogOutcome::Error, now, None, Some(e.to_string()))?;
                self.notify(
                    Notification::new("Removal failed", "Will retry next cycle.", COLOR_ALERT)
                        .field("Member", display_name, true)
                        .field("ID", principal.as_str(), true)
                        .field("Error", e.to_string(), false),
                )
                .await;
                self.defer(principal, now)?;
                stats.deferred += 1;
            }
        }
        Ok(())
    }

    fn defer(&self, principal: &warden_types::PrincipalId, now: Timestamp) -> Result<(), GateError> {
        let next = now.plus_millis(self.params().poll_interval_ms);
        self.store()
            .defer_deadline(&self.params().group, principal, next, now)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use warden_platform::{NullPlatform, Principal, RemovalCall, Tag};
    use warden_store::{MemoryStore, ModerationLogStore};
    use warden_types::{GroupId, PrincipalId, TagId};

    use crate::GateParams;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    fn ts(millis: u64) -> Timestamp {
        Timestamp::new(millis)
    }

    fn params() -> GateParams {
        let mut p = GateParams::new(
            group(),
            TagId::new("verified"),
            TagId::new("restricted"),
            TagId::new("provisional"),
            TagId::new("automata"),
        );
        p.verify_timeout_ms = 1_000;
        p.poll_interval_ms = 500;
        p.suppression_ms = 2_000;
        p
    }

    fn member(id: &str, tags: Vec<Tag>) -> Principal {
        Principal {
            id: PrincipalId::new(id),
            display_name: format!("member-{id}"),
            is_bot: false,
            tags,
        }
    }

    fn tag(id: &str) -> Tag {
        Tag {
            id: TagId::new(id),
            priority: 1,
            managed: false,
        }
    }

    fn fixture() -> (Arc<NullPlatform>, Arc<MemoryStore>, VerificationGate<NullPlatform, MemoryStore>) {
        let platform = Arc::new(NullPlatform::new());
        let store = Arc::new(MemoryStore::new());
        let gate = VerificationGate::new(platform.clone(), store.clone(), params());
        (platform, store, gate)
    }

    #[tokio::test]
    async fn first_expiry_kicks_second_bans() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("1");
        platform.insert_principal(group(), member("1", vec![tag("provisional")]));
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(1_500)).await.unwrap();
        assert_eq!((stats.kicked, stats.banned), (1, 0));
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Kicked);
        assert_eq!(record.fail_count, 1);
        assert_eq!(
            platform.removals(),
            vec![RemovalCall {
                principal: p.clone(),
                severity: RemovalSeverity::Soft,
                reason: "verification timeout".into(),
            }]
        );

        // Rejoin, time out again: hard removal, no third escalation level.
        platform.insert_principal(group(), member("1", vec![tag("provisional")]));
        store.upsert_pending(&group(), &p, ts(10_000), ts(11_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(12_000)).await.unwrap();
        assert_eq!((stats.kicked, stats.banned), (0, 1));
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Banned);
        assert_eq!(record.fail_count, 2);
        assert_eq!(platform.removals()[1].severity, RemovalSeverity::Hard);
        assert!(record.invariant_holds());
    }

    #[tokio::test]
    async fn live_verified_tag_resolves_without_removal() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("2");
        platform.insert_principal(group(), member("2", vec![tag("verified")]));
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(2_000)).await.unwrap();

        assert_eq!(stats.verified, 1);
        assert!(platform.removals().is_empty());
        assert_eq!(
            store.get_record(&group(), &p).unwrap().unwrap().status,
            VerificationStatus::Verified
        );
    }

    #[tokio::test]
    async fn departed_principal_is_closed_as_left() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("3");
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(2_000)).await.unwrap();

        assert_eq!(stats.left, 1);
        assert!(platform.removals().is_empty());
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Left);
        assert!(record.invariant_holds());
    }

    #[tokio::test]
    async fn transient_fetch_failure_defers_one_interval() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("4");
        platform.insert_principal(group(), member("4", vec![]));
        platform.fail_fetch(p.clone());
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(2_000)).await.unwrap();

        assert_eq!(stats.deferred, 1);
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Pending);
        assert_eq!(record.deadline_at, Some(ts(2_500)));
        let log = store.log_for_principal(&group(), &p).unwrap();
        assert_eq!(log.last().unwrap().outcome, LogOutcome::Error);

        // Error cleared: the deferred row escalates next pass.
        platform.clear_fetch_failure(&p);
        let stats = gate.run_reconcile_cycle(ts(3_000)).await.unwrap();
        assert_eq!(stats.kicked, 1);
    }

    #[tokio::test]
    async fn suppressed_principal_is_left_alone() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("5");
        platform.insert_principal(group(), member("5", vec![]));
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();
        gate.suppression().suppress(&p, ts(1_400));

        let stats = gate.run_reconcile_cycle(ts(1_500)).await.unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(platform.removals().is_empty());

        // Window over (2s): normal escalation resumes.
        let stats = gate.run_reconcile_cycle(ts(4_000)).await.unwrap();
        assert_eq!(stats.kicked, 1);
    }

    #[tokio::test]
    async fn finalized_record_is_skipped_despite_stale_scan() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("6");
        platform.insert_principal(group(), member("6", vec![]));
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();
        // Simulate a verification landing between scan and action.
        store.set_verified(&group(), &p, ts(1_200)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(1_500)).await.unwrap();

        assert_eq!(stats.scanned, 0);
        assert!(platform.removals().is_empty());
    }

    #[tokio::test]
    async fn removal_failure_is_logged_notified_and_deferred() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("7");
        platform.insert_principal(group(), member("7", vec![]));
        platform.fail_removal(p.clone());
        store.upsert_pending(&group(), &p, ts(0), ts(1_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(2_000)).await.unwrap();

        assert_eq!(stats.deferred, 1);
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Pending);
        assert_eq!(record.deadline_at, Some(ts(2_500)));
        assert_eq!(platform.notifications()[0].title, "Removal failed");
        let log = store.log_for_principal(&group(), &p).unwrap();
        assert!(log.iter().any(|e| e.action == "kick" && e.outcome == LogOutcome::Error));
    }

    #[tokio::test]
    async fn batch_survives_one_bad_principal() {
        let (platform, store, gate) = fixture();
        let bad = PrincipalId::new("8");
        let good = PrincipalId::new("9");
        platform.insert_principal(group(), member("8", vec![]));
        platform.insert_principal(group(), member("9", vec![]));
        platform.fail_removal(bad.clone());
        store.upsert_pending(&group(), &bad, ts(0), ts(900)).unwrap();
        store.upsert_pending(&group(), &good, ts(0), ts(1_000)).unwrap();

        let stats = gate.run_reconcile_cycle(ts(2_000)).await.unwrap();

        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.kicked, 1);
        assert_eq!(
            store.get_record(&group(), &good).unwrap().unwrap().status,
            VerificationStatus::Kicked
        );
    }
}
