//! Event-driven verification state machine.

use std::sync::Arc;

use tracing::{info, warn};

use warden_platform::{Notification, Platform, Principal, RemovalKind};
use warden_store::{
    LogOutcome, ModerationLogEntry, ModerationLogStore, ProtectedIdentity, RegistryStore, Store,
    VerificationStatus, VerificationStore,
};
use warden_types::{PrincipalId, TagId, Timestamp};

use crate::impersonation::find_collision;
use crate::params::GateParams;
use crate::suppress::SuppressionWindow;
use crate::GateError;

pub(crate) const COLOR_ALERT: u32 = 0xed4245;
pub(crate) const COLOR_WARNING: u32 = 0xfee75c;
pub(crate) const COLOR_RESOLVED: u32 = 0x57f287;

/// What `on_join` decided for the principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Bot account: managed tag only, no probation.
    Automata,
    RejoinJailed,
    RejoinBanned,
    /// Impersonating display name: contained immediately.
    Interred,
    AlreadyVerified,
    AlreadyRestricted,
    /// Normal path: provisional tag + probation window.
    Probation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagChangeOutcome {
    Ignored,
    Verified,
    Jailed,
    Probation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameChangeOutcome {
    Ignored,
    Exempt,
    Interred,
}

/// The admission gate for one monitored group.
///
/// All handlers take `now` explicitly so tests drive the clock; the node
/// passes `Timestamp::now()`. Handlers are written per-principal: a
/// platform failure on one principal is logged and never propagates into
/// unrelated state.
pub struct VerificationGate<P, S> {
    platform: Arc<P>,
    store: Arc<S>,
    params: GateParams,
    suppression: SuppressionWindow,
}

impl<P: Platform, S: Store> VerificationGate<P, S> {
    pub fn new(platform: Arc<P>, store: Arc<S>, params: GateParams) -> Self {
        let suppression = SuppressionWindow::new(params.suppression_ms);
        Self {
            platform,
            store,
            params,
            suppression,
        }
    }

    pub fn params(&self) -> &GateParams {
        &self.params
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn platform(&self) -> &P {
        &self.platform
    }

    pub(crate) fn suppression(&self) -> &SuppressionWindow {
        &self.suppression
    }

    /// Handle a principal joining the group.
    pub async fn on_join(
        &self,
        principal: &Principal,
        now: Timestamp,
    ) -> Result<JoinOutcome, GateError> {
        let group = &self.params.group;

        if principal.is_bot {
            if let Err(e) = self
                .platform
                .add_tag(group, &principal.id, &self.params.automata_tag, "automated account")
                .await
            {
                warn!(principal = %principal.id, error = %e, "automata tag failed");
            }
            return Ok(JoinOutcome::Automata);
        }

        // A prior terminal record outranks the normal join path.
        let record = self.store.get_record(group, &principal.id)?;
        match record.as_ref().map(|r| r.status) {
            Some(VerificationStatus::Jailed) => {
                return self.handle_rejoin(principal, "rejoin_jailed", now).await;
            }
            Some(VerificationStatus::Banned) => {
                return self.handle_rejoin(principal, "rejoin_banned", now).await;
            }
            _ => {}
        }

        if !self.is_exempt_from_collision(principal)? {
            if let Some(owner) = find_collision(
                &*self.store,
                group,
                &principal.display_name,
                &principal.id,
            )? {
                self.intern_for_impersonation(principal, &owner, now).await;
                return Ok(JoinOutcome::Interred);
            }
        }

        // Tags already present at join (restores, bridged invites)
        // normalize the fresh record instead of opening probation.
        if principal.has_tag(&self.params.verified_tag) {
            self.store.set_verified(group, &principal.id, now)?;
            self.log(principal.id.clone(), "join", LogOutcome::NoChange, now, Some("already verified".into()), None)?;
            return Ok(JoinOutcome::AlreadyVerified);
        }
        if principal.has_tag(&self.params.restricted_tag) {
            self.store.set_jailed(group, &principal.id, now)?;
            self.log(principal.id.clone(), "join", LogOutcome::NoChange, now, Some("already restricted".into()), None)?;
            return Ok(JoinOutcome::AlreadyRestricted);
        }

        if let Err(e) = self
            .platform
            .add_tag(group, &principal.id, &self.params.provisional_tag, "verification pending")
            .await
        {
            warn!(principal = %principal.id, error = %e, "provisional tag failed");
        }
        let deadline = now.plus_millis(self.params.verify_timeout_ms);
        self.store
            .upsert_pending(group, &principal.id, now, deadline)?;
        self.log(principal.id.clone(), "join", LogOutcome::Success, now, None, None)?;
        info!(principal = %principal.id, %deadline, "probation opened");
        Ok(JoinOutcome::Probation)
    }

    async fn handle_rejoin(
        &self,
        principal: &Principal,
        action: &str,
        now: Timestamp,
    ) -> Result<JoinOutcome, GateError> {
        let group = &self.params.group;
        if let Err(e) = self
            .platform
            .add_tag(group, &principal.id, &self.params.restricted_tag, "re-restriction on rejoin")
            .await
        {
            warn!(principal = %principal.id, error = %e, "re-restriction failed");
            self.log(principal.id.clone(), action, LogOutcome::Error, now, None, Some(e.to_string()))?;
        } else {
            self.log(principal.id.clone(), action, LogOutcome::Success, now, None, None)?;
        }
        self.suppression.suppress(&principal.id, now);
        self.notify(
            Notification::new("Restricted member rejoined", "Containment re-applied on join.", COLOR_WARNING)
                .field("Member", &principal.display_name, true)
                .field("ID", principal.id.as_str(), true),
        )
        .await;
        Ok(match action {
            "rejoin_banned" => JoinOutcome::RejoinBanned,
            _ => JoinOutcome::RejoinJailed,
        })
    }

    /// Handle an observed change to a principal's tag set.
    pub async fn on_tag_change(
        &self,
        before: &Principal,
        after: &Principal,
        now: Timestamp,
    ) -> Result<TagChangeOutcome, GateError> {
        if after.is_bot {
            return Ok(TagChangeOutcome::Ignored);
        }
        let group = &self.params.group;
        let gained = |tag: &TagId| !before.has_tag(tag) && after.has_tag(tag);

        let outcome = if gained(&self.params.verified_tag) {
            self.store.set_verified(group, &after.id, now)?;
            self.suppression.suppress(&after.id, now);
            self.log(after.id.clone(), "verified", LogOutcome::Success, now, None, None)?;
            info!(principal = %after.id, "verified");
            TagChangeOutcome::Verified
        } else if gained(&self.params.restricted_tag) {
            self.store.set_jailed(group, &after.id, now)?;
            self.suppression.suppress(&after.id, now);
            self.log(after.id.clone(), "jailed", LogOutcome::Success, now, None, None)?;
            TagChangeOutcome::Jailed
        } else if gained(&self.params.provisional_tag)
            && !after.has_tag(&self.params.verified_tag)
            && !after.has_tag(&self.params.restricted_tag)
        {
            let deadline = now.plus_millis(self.params.verify_timeout_ms);
            self.store.upsert_pending(group, &after.id, now, deadline)?;
            self.log(after.id.clone(), "provisional", LogOutcome::Success, now, None, None)?;
            TagChangeOutcome::Probation
        } else {
            TagChangeOutcome::Ignored
        };

        self.enforce_single_capability_tag(after).await;
        Ok(outcome)
    }

    /// Keep only the highest-priority non-managed tag.
    async fn enforce_single_capability_tag(&self, principal: &Principal) {
        let capability = principal.capability_tags();
        if capability.len() < 2 {
            return;
        }
        let Some(keep) = principal.highest_capability_tag() else {
            return;
        };
        let strip: Vec<TagId> = capability
            .iter()
            .filter(|t| t.id != keep.id)
            .map(|t| t.id.clone())
            .collect();
        if let Err(e) = self
            .platform
            .remove_tags(&self.params.group, &principal.id, &strip, "single capability tag")
            .await
        {
            warn!(principal = %principal.id, error = %e, "tag policy enforcement failed");
        }
    }

    /// Handle the platform reporting a principal gone (ban/kick/leave).
    pub async fn on_external_termination(
        &self,
        principal: &PrincipalId,
        kind: RemovalKind,
        now: Timestamp,
    ) -> Result<(), GateError> {
        let group = &self.params.group;
        self.suppression.suppress(principal, now);

        let was_jailed = self
            .store
            .get_record(group, principal)?
            .is_some_and(|r| r.status == VerificationStatus::Jailed);

        // Jailed containment survives a kick or voluntary leave so the
        // rejoin path re-restricts; a platform ban always wins.
        let (status, action, detail) = match kind {
            RemovalKind::Banned => (VerificationStatus::Banned, "ban", None),
            RemovalKind::Kicked if was_jailed => {
                (VerificationStatus::Jailed, "kick", Some("jailed status preserved"))
            }
            RemovalKind::Kicked => (VerificationStatus::Kicked, "kick", None),
            RemovalKind::Left if was_jailed => {
                (VerificationStatus::Jailed, "leave", Some("jailed status preserved"))
            }
            RemovalKind::Left => (VerificationStatus::Left, "leave", None),
        };

        self.store.set_terminal(group, principal, status, now)?;
        self.log(principal.clone(), action, LogOutcome::Success, now, detail.map(str::to_string), None)?;
        Ok(())
    }

    /// Handle a display-name change (group nickname or global name).
    pub async fn on_display_name_change(
        &self,
        principal: &PrincipalId,
        new_name: &str,
        now: Timestamp,
    ) -> Result<NameChangeOutcome, GateError> {
        let group = &self.params.group;
        let live = match self.platform.fetch_principal(group, principal).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => return Ok(NameChangeOutcome::Ignored),
            Err(e) => return Err(e.into()),
        };
        if live.is_bot || self.is_exempt_from_collision(&live)? {
            return Ok(NameChangeOutcome::Exempt);
        }
        match find_collision(&*self.store, group, new_name, principal)? {
            Some(owner) => {
                let mut snapshot = live;
                snapshot.display_name = new_name.to_string();
                self.intern_for_impersonation(&snapshot, &owner, now).await;
                Ok(NameChangeOutcome::Interred)
            }
            None => Ok(NameChangeOutcome::Ignored),
        }
    }

    /// Principals already contained, protected, or registered never
    /// trigger the impersonation check.
    fn is_exempt_from_collision(&self, principal: &Principal) -> Result<bool, GateError> {
        if principal.has_tag(&self.params.restricted_tag) {
            return Ok(true);
        }
        if self
            .params
            .protected_tags
            .iter()
            .any(|t| principal.has_tag(t))
        {
            return Ok(true);
        }
        if self.params.protected_principals.contains(&principal.id) {
            return Ok(true);
        }
        Ok(self
            .store
            .is_active_identity(&self.params.group, &principal.id)?)
    }

    async fn intern_for_impersonation(
        &self,
        principal: &Principal,
        owner: &PrincipalId,
        now: Timestamp,
    ) {
        let detail = format!(
            "display name {:?} collides with protected identity {}",
            principal.display_name, owner
        );
        match self.intern(&principal.id, "impersonation containment", now).await {
            Ok(()) => {
                if let Err(e) = self.log(
                    principal.id.clone(),
                    "interment",
                    LogOutcome::Success,
                    now,
                    Some(detail.clone()),
                    None,
                ) {
                    warn!(principal = %principal.id, error = %e, "interment log failed");
                }
            }
            Err(e) => {
                warn!(principal = %principal.id, error = %e, "interment failed");
                if let Err(log_err) = self.log(
                    principal.id.clone(),
                    "interment",
                    LogOutcome::Error,
                    now,
                    Some(detail.clone()),
                    Some(e.to_string()),
                ) {
                    warn!(principal = %principal.id, error = %log_err, "interment log failed");
                }
            }
        }
        self.notify(
            Notification::new("Impersonation detected", detail, COLOR_ALERT)
                .field("Member", &principal.display_name, true)
                .field("ID", principal.id.as_str(), true)
                .field("Protected identity", owner.as_str(), true),
        )
        .await;
    }

    /// Contain a principal: strip every non-managed tag, apply the
    /// restricted tag, persist `Jailed`.
    async fn intern(
        &self,
        principal: &PrincipalId,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), GateError> {
        let group = &self.params.group;
        let live = self.platform.fetch_principal(group, principal).await?;
        let mut kept: Vec<TagId> = live
            .tags
            .iter()
            .filter(|t| t.managed)
            .map(|t| t.id.clone())
            .collect();
        kept.push(self.params.restricted_tag.clone());
        self.platform
            .set_tags(group, principal, &kept, reason)
            .await?;
        self.store.set_jailed(group, principal, now)?;
        self.suppression.suppress(principal, now);
        Ok(())
    }

    // Operator adapters.

    /// Zero a principal's escalation counter.
    pub fn reset_fails(
        &self,
        principal: &PrincipalId,
        now: Timestamp,
    ) -> Result<bool, GateError> {
        let changed = self.store.reset_fails(&self.params.group, principal, now)?;
        let outcome = if changed {
            LogOutcome::Success
        } else {
            LogOutcome::NoChange
        };
        self.log(principal.clone(), "reset_fails", outcome, now, None, None)?;
        Ok(changed)
    }

    /// Register (or re-activate) a protected identity.
    pub async fn protect_principal(
        &self,
        principal: &PrincipalId,
        added_by: Option<PrincipalId>,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<(), GateError> {
        let group = &self.params.group;
        let current_name = match self.platform.fetch_principal(group, principal).await {
            Ok(p) => Some(p.display_name),
            Err(_) => self.platform.lookup_display_name(principal).await.ok(),
        };
        let existing = self.store.get_identity(group, principal)?;
        let identity = ProtectedIdentity {
            principal_id: principal.clone(),
            current_name: current_name.or_else(|| existing.as_ref().and_then(|i| i.current_name.clone())),
            active: true,
            added_by: added_by.or_else(|| existing.as_ref().and_then(|i| i.added_by.clone())),
            notes: notes.or_else(|| existing.as_ref().and_then(|i| i.notes.clone())),
            created_at: existing.as_ref().map(|i| i.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.store.upsert_identity(group, identity)?;
        self.log(principal.clone(), "protect", LogOutcome::Success, now, None, None)?;
        Ok(())
    }

    /// Deactivate a protected identity. Returns whether a row existed.
    pub fn unprotect_principal(
        &self,
        principal: &PrincipalId,
        now: Timestamp,
    ) -> Result<bool, GateError> {
        let existed =
            self.store
                .set_identity_active(&self.params.group, principal, false, now)?;
        let outcome = if existed {
            LogOutcome::Success
        } else {
            LogOutcome::NoChange
        };
        self.log(principal.clone(), "unprotect", outcome, now, None, None)?;
        Ok(existed)
    }

    /// Operator-initiated containment.
    pub async fn interment_principal(
        &self,
        principal: &PrincipalId,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), GateError> {
        self.intern(principal, reason, now).await?;
        self.log(
            principal.clone(),
            "interment",
            LogOutcome::Success,
            now,
            Some(reason.to_string()),
            None,
        )?;
        Ok(())
    }

    pub(crate) fn log(
        &self,
        principal: PrincipalId,
        action: &str,
        outcome: LogOutcome,
        now: Timestamp,
        detail: Option<String>,
        error: Option<String>,
    ) -> Result<(), GateError> {
        let mut entry = ModerationLogEntry::new(principal, action, outcome, now);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        if let Some(error) = error {
            entry = entry.with_error(error);
        }
        self.store.append_log(&self.params.group, entry)?;
        Ok(())
    }

    /// Best-effort admin notification.
    pub(crate) async fn notify(&self, notification: Notification) {
        if let Err(e) = self
            .platform
            .send_notification(&self.params.group, notification)
            .await
        {
            warn!(error = %e, "admin notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_platform::{NullPlatform, Tag};
    use warden_store::{MemoryStore, VerificationStore};
    use warden_types::GroupId;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    fn params() -> GateParams {
        let mut p = GateParams::new(
            group(),
            TagId::new("verified"),
            TagId::new("restricted"),
            TagId::new("provisional"),
            TagId::new("automata"),
        );
        p.protected_tags = vec![TagId::new("staff")];
        p
    }

    fn tag(id: &str, priority: i64) -> Tag {
        Tag {
            id: TagId::new(id),
            priority,
            managed: false,
        }
    }

    fn member(id: &str, name: &str, tags: Vec<Tag>) -> Principal {
        Principal {
            id: PrincipalId::new(id),
            display_name: name.to_string(),
            is_bot: false,
            tags,
        }
    }

    fn fixture() -> (Arc<NullPlatform>, Arc<MemoryStore>, VerificationGate<NullPlatform, MemoryStore>) {
        let platform = Arc::new(NullPlatform::new());
        platform.define_tag(tag("verified", 30));
        platform.define_tag(tag("restricted", 20));
        platform.define_tag(tag("provisional", 10));
        platform.define_tag(Tag {
            id: TagId::new("automata"),
            priority: 40,
            managed: true,
        });
        let store = Arc::new(MemoryStore::new());
        let gate = VerificationGate::new(platform.clone(), store.clone(), params());
        (platform, store, gate)
    }

    fn ts(millis: u64) -> Timestamp {
        Timestamp::new(millis)
    }

    #[tokio::test]
    async fn join_opens_probation_with_provisional_tag() {
        let (platform, store, gate) = fixture();
        let joiner = member("1", "newcomer", vec![]);
        platform.insert_principal(group(), joiner.clone());

        let outcome = gate.on_join(&joiner, ts(1_000)).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Probation);
        let record = store.get_record(&group(), &joiner.id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Pending);
        assert_eq!(
            record.deadline_at,
            Some(ts(1_000 + crate::params::DEFAULT_VERIFY_TIMEOUT_MS))
        );
        assert_eq!(
            platform.tags_of(&group(), &joiner.id).unwrap(),
            vec![TagId::new("provisional")]
        );
    }

    #[tokio::test]
    async fn bot_gets_automata_tag_and_no_record() {
        let (platform, store, gate) = fixture();
        let mut bot = member("2", "helper-bot", vec![]);
        bot.is_bot = true;
        platform.insert_principal(group(), bot.clone());

        let outcome = gate.on_join(&bot, ts(0)).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Automata);
        assert!(store.get_record(&group(), &bot.id).unwrap().is_none());
        assert_eq!(
            platform.tags_of(&group(), &bot.id).unwrap(),
            vec![TagId::new("automata")]
        );
    }

    #[tokio::test]
    async fn jailed_rejoin_is_re_restricted_without_new_deadline() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("3");
        store.set_jailed(&group(), &p, ts(0)).unwrap();
        let rejoiner = member("3", "returnee", vec![]);
        platform.insert_principal(group(), rejoiner.clone());

        let outcome = gate.on_join(&rejoiner, ts(5_000)).await.unwrap();

        assert_eq!(outcome, JoinOutcome::RejoinJailed);
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Jailed);
        assert_eq!(record.deadline_at, None);
        assert_eq!(
            platform.tags_of(&group(), &p).unwrap(),
            vec![TagId::new("restricted")]
        );
        assert_eq!(platform.notifications().len(), 1);
    }

    #[tokio::test]
    async fn banned_rejoin_keeps_banned_status() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("4");
        store
            .set_terminal(&group(), &p, VerificationStatus::Banned, ts(0))
            .unwrap();
        let rejoiner = member("4", "returnee", vec![]);
        platform.insert_principal(group(), rejoiner.clone());

        let outcome = gate.on_join(&rejoiner, ts(5_000)).await.unwrap();

        assert_eq!(outcome, JoinOutcome::RejoinBanned);
        let record = store.get_record(&group(), &p).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Banned);
    }

    #[tokio::test]
    async fn impersonating_joiner_is_interred_not_put_on_probation() {
        let (platform, store, gate) = fixture();
        store
            .upsert_identity(
                &group(),
                ProtectedIdentity {
                    principal_id: PrincipalId::new("100"),
                    current_name: Some("Founder".into()),
                    active: true,
                    added_by: None,
                    notes: None,
                    created_at: ts(0),
                    updated_at: ts(0),
                },
            )
            .unwrap();
        let impostor = member("666", "  FOUNDER ", vec![]);
        platform.insert_principal(group(), impostor.clone());

        let outcome = gate.on_join(&impostor, ts(1_000)).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Interred);
        let record = store.get_record(&group(), &impostor.id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Jailed);
        assert_eq!(record.deadline_at, None);
        assert_eq!(
            platform.tags_of(&group(), &impostor.id).unwrap(),
            vec![TagId::new("restricted")]
        );
        let alert = &platform.notifications()[0];
        assert_eq!(alert.title, "Impersonation detected");
    }

    #[tokio::test]
    async fn protected_owner_is_exempt_from_own_name() {
        let (platform, store, gate) = fixture();
        store
            .upsert_identity(
                &group(),
                ProtectedIdentity {
                    principal_id: PrincipalId::new("100"),
                    current_name: Some("Founder".into()),
                    active: true,
                    added_by: None,
                    notes: None,
                    created_at: ts(0),
                    updated_at: ts(0),
                },
            )
            .unwrap();
        let owner = member("100", "Founder", vec![]);
        platform.insert_principal(group(), owner.clone());

        let outcome = gate.on_join(&owner, ts(1_000)).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Probation);
    }

    #[tokio::test]
    async fn verified_tag_at_join_normalizes_record() {
        let (platform, store, gate) = fixture();
        let joiner = member("5", "restored", vec![tag("verified", 30)]);
        platform.insert_principal(group(), joiner.clone());

        let outcome = gate.on_join(&joiner, ts(1_000)).await.unwrap();

        assert_eq!(outcome, JoinOutcome::AlreadyVerified);
        let record = store.get_record(&group(), &joiner.id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Verified);
        assert!(record.invariant_holds());
    }

    #[tokio::test]
    async fn gaining_verified_tag_finalizes_and_is_idempotent() {
        let (platform, store, gate) = fixture();
        let before = member("6", "m", vec![tag("provisional", 10)]);
        let after = member("6", "m", vec![tag("verified", 30)]);
        platform.insert_principal(group(), after.clone());
        store
            .upsert_pending(&group(), &before.id, ts(0), ts(100))
            .unwrap();

        assert_eq!(
            gate.on_tag_change(&before, &after, ts(50)).await.unwrap(),
            TagChangeOutcome::Verified
        );
        // Replayed event: the edge is gone, nothing changes.
        assert_eq!(
            gate.on_tag_change(&after, &after, ts(60)).await.unwrap(),
            TagChangeOutcome::Ignored
        );

        let record = store.get_record(&group(), &before.id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Verified);
        assert_eq!(record.fail_count, 0);
        assert!(record.invariant_holds());
    }

    #[tokio::test]
    async fn tag_policy_keeps_highest_priority_capability_tag() {
        let (platform, _store, gate) = fixture();
        let before = member("7", "m", vec![tag("provisional", 10)]);
        let after = member("7", "m", vec![tag("provisional", 10), tag("verified", 30)]);
        platform.insert_principal(group(), after.clone());

        gate.on_tag_change(&before, &after, ts(0)).await.unwrap();

        assert_eq!(
            platform.tags_of(&group(), &after.id).unwrap(),
            vec![TagId::new("verified")]
        );
    }

    #[tokio::test]
    async fn tag_mutation_failure_leaves_status_untouched() {
        let (platform, store, gate) = fixture();
        let before = member("8", "m", vec![]);
        let after = member("8", "m", vec![tag("provisional", 10), tag("verified", 30)]);
        platform.insert_principal(group(), after.clone());
        platform.fail_tag_mutations(true);

        let outcome = gate.on_tag_change(&before, &after, ts(10)).await.unwrap();

        assert_eq!(outcome, TagChangeOutcome::Verified);
        let record = store.get_record(&group(), &after.id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Verified);
    }

    #[tokio::test]
    async fn external_ban_overrides_jailed_but_kick_preserves_it() {
        let (_platform, store, gate) = fixture();
        let p = PrincipalId::new("9");

        store.set_jailed(&group(), &p, ts(0)).unwrap();
        gate.on_external_termination(&p, RemovalKind::Kicked, ts(10))
            .await
            .unwrap();
        assert_eq!(
            store.get_record(&group(), &p).unwrap().unwrap().status,
            VerificationStatus::Jailed
        );

        gate.on_external_termination(&p, RemovalKind::Banned, ts(20))
            .await
            .unwrap();
        assert_eq!(
            store.get_record(&group(), &p).unwrap().unwrap().status,
            VerificationStatus::Banned
        );
    }

    #[tokio::test]
    async fn external_leave_suppresses_the_poller() {
        let (_platform, store, gate) = fixture();
        let p = PrincipalId::new("10");
        store.upsert_pending(&group(), &p, ts(0), ts(100)).unwrap();

        gate.on_external_termination(&p, RemovalKind::Left, ts(50))
            .await
            .unwrap();

        assert!(gate.suppression().is_suppressed(&p, ts(60)));
        assert_eq!(
            store.get_record(&group(), &p).unwrap().unwrap().status,
            VerificationStatus::Left
        );
    }

    #[tokio::test]
    async fn name_change_to_protected_name_interrs() {
        let (platform, store, gate) = fixture();
        store
            .upsert_identity(
                &group(),
                ProtectedIdentity {
                    principal_id: PrincipalId::new("100"),
                    current_name: Some("Founder".into()),
                    active: true,
                    added_by: None,
                    notes: None,
                    created_at: ts(0),
                    updated_at: ts(0),
                },
            )
            .unwrap();
        let sleeper = member("11", "innocuous", vec![]);
        platform.insert_principal(group(), sleeper.clone());

        let outcome = gate
            .on_display_name_change(&sleeper.id, "founder", ts(1_000))
            .await
            .unwrap();

        assert_eq!(outcome, NameChangeOutcome::Interred);
        assert_eq!(
            store.get_record(&group(), &sleeper.id).unwrap().unwrap().status,
            VerificationStatus::Jailed
        );
    }

    #[tokio::test]
    async fn staff_tag_exempts_from_name_check() {
        let (platform, store, gate) = fixture();
        platform.define_tag(tag("staff", 50));
        store
            .upsert_identity(
                &group(),
                ProtectedIdentity {
                    principal_id: PrincipalId::new("100"),
                    current_name: Some("Founder".into()),
                    active: true,
                    added_by: None,
                    notes: None,
                    created_at: ts(0),
                    updated_at: ts(0),
                },
            )
            .unwrap();
        let staffer = member("12", "Founder", vec![tag("staff", 50)]);
        platform.insert_principal(group(), staffer.clone());

        let outcome = gate
            .on_display_name_change(&staffer.id, "Founder", ts(0))
            .await
            .unwrap();
        assert_eq!(outcome, NameChangeOutcome::Exempt);
    }

    #[tokio::test]
    async fn operator_protect_and_unprotect_round_trip() {
        let (platform, store, gate) = fixture();
        let p = PrincipalId::new("100");
        platform.insert_principal(group(), member("100", "Founder", vec![]));

        gate.protect_principal(&p, Some(PrincipalId::new("admin")), None, ts(10))
            .await
            .unwrap();
        let identity = store.get_identity(&group(), &p).unwrap().unwrap();
        assert!(identity.active);
        assert_eq!(identity.current_name.as_deref(), Some("Founder"));

        assert!(gate.unprotect_principal(&p, ts(20)).unwrap());
        assert!(!store.is_active_identity(&group(), &p).unwrap());
        assert!(!gate.unprotect_principal(&PrincipalId::new("ghost"), ts(30)).unwrap());
    }

    #[tokio::test]
    async fn reset_fails_reports_change() {
        let (_platform, store, gate) = fixture();
        let p = PrincipalId::new("13");
        store.upsert_pending(&group(), &p, ts(0), ts(100)).unwrap();
        store.mark_kicked(&group(), &p, 2, ts(50)).unwrap();

        assert!(gate.reset_fails(&p, ts(60)).unwrap());
        assert!(!gate.reset_fails(&p, ts(70)).unwrap());
    }
}
