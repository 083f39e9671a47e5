//! Protected-registry health cycle.
//!
//! Runs on its own timer (and once at startup): refreshes cached display
//! names, checks that every protected-tag holder is registered, detects
//! protected names claimed by more than one principal, and raises
//! throttled alerts. Issues that stop being reported get exactly one
//! "resolved" notification before their throttle key is deleted.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use warden_platform::{Notification, Platform};
use warden_store::{RegistryStore, Store, ThrottleStore};
use warden_types::{normalize_name, PrincipalId, Timestamp};

use crate::gate::{VerificationGate, COLOR_ALERT, COLOR_RESOLVED, COLOR_WARNING};
use crate::GateError;

const MISSING_PREFIX: &str = "missing:";
const DUPLICATE_PREFIX: &str = "duplicate:";
const DUPLICATE_DM_PREFIX: &str = "duplicate_dm:";

/// Counters for one health pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthStats {
    pub names_refreshed: u64,
    pub open_issues: u64,
    pub alerts_sent: u64,
    pub dms_sent: u64,
    pub resolved: u64,
}

impl<P: Platform, S: Store> VerificationGate<P, S> {
    /// Run one registry health pass.
    pub async fn run_registry_health_cycle(
        &self,
        now: Timestamp,
    ) -> Result<HealthStats, GateError> {
        let mut stats = HealthStats::default();

        self.refresh_identity_names(now, &mut stats).await?;

        let group = &self.params().group;
        let members = self.platform().list_principals(group).await?;
        let mut open_issues: HashSet<String> = HashSet::new();

        // Coverage: protected-tag holders must hold an active registry row.
        for member in &members {
            let protected = self
                .params()
                .protected_tags
                .iter()
                .any(|t| member.has_tag(t));
            if !protected || self.store().is_active_identity(group, &member.id)? {
                continue;
            }
            let key = format!("{MISSING_PREFIX}{}", member.id);
            open_issues.insert(key.clone());
            if self.should_alert(&key, now)? {
                self.notify(
                    Notification::new(
                        "Protected member not registered",
                        "A protected-tag holder has no active registry entry, so their name is unguarded.",
                        COLOR_WARNING,
                    )
                    .field("Member", &member.display_name, true)
                    .field("ID", member.id.as_str(), true),
                )
                .await;
                self.store().set_throttle(group, &key, now)?;
                stats.alerts_sent += 1;
            }
        }

        // Duplicates: one normalized name, several active owners.
        for (name, owners) in self.registry_name_owners()? {
            if owners.len() < 2 {
                continue;
            }
            let key = format!("{DUPLICATE_PREFIX}{name}");
            open_issues.insert(key.clone());
            let holder_list = owners
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if self.should_alert(&key, now)? {
                self.notify(
                    Notification::new(
                        "Protected name conflict",
                        format!("The protected name {name:?} is registered to multiple principals."),
                        COLOR_ALERT,
                    )
                    .field("Name", &name, true)
                    .field("Holders", &holder_list, false),
                )
                .await;
                self.store().set_throttle(group, &key, now)?;
                stats.alerts_sent += 1;
            }

            let dm_key = format!("{DUPLICATE_DM_PREFIX}{name}");
            if self.should_alert(&dm_key, now)? {
                for owner in &owners {
                    let dm = Notification::new(
                        "Protected name conflict",
                        format!(
                            "Your protected name {name:?} is also registered to another principal. Holders: {holder_list}."
                        ),
                        COLOR_ALERT,
                    );
                    if let Err(e) = self.platform().send_direct(owner, dm).await {
                        debug!(principal = %owner, error = %e, "conflict DM failed");
                    } else {
                        stats.dms_sent += 1;
                    }
                }
                self.store().set_throttle(group, &dm_key, now)?;
            }
        }

        self.resolve_stale_issues(&open_issues, &mut stats).await?;
        stats.open_issues = open_issues.len() as u64;
        Ok(stats)
    }

    /// Refresh cached display names from the platform, falling back to
    /// the group-independent lookup when the member fetch fails.
    async fn refresh_identity_names(
        &self,
        now: Timestamp,
        stats: &mut HealthStats,
    ) -> Result<(), GateError> {
        let group = &self.params().group;
        for identity in self.store().active_identities(group)? {
            let name = match self.platform().fetch_principal(group, &identity.principal_id).await {
                Ok(p) => Some(p.display_name),
                Err(_) => match self
                    .platform()
                    .lookup_display_name(&identity.principal_id)
                    .await
                {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!(principal = %identity.principal_id, error = %e, "name refresh failed");
                        None
                    }
                },
            };
            if let Some(name) = name {
                if identity.current_name.as_deref() != Some(name.as_str()) {
                    self.store().update_identity_name(
                        group,
                        &identity.principal_id,
                        Some(name),
                        now,
                    )?;
                    stats.names_refreshed += 1;
                }
            }
        }
        Ok(())
    }

    /// Normalized protected names (identities and aliases) mapped to the
    /// set of active principals claiming each.
    fn registry_name_owners(
        &self,
    ) -> Result<HashMap<String, BTreeSet<PrincipalId>>, GateError> {
        let group = &self.params().group;
        let mut owners: HashMap<String, BTreeSet<PrincipalId>> = HashMap::new();
        for identity in self.store().active_identities(group)? {
            if let Some(name) = &identity.current_name {
                let normalized = normalize_name(name);
                if !normalized.is_empty() {
                    owners
                        .entry(normalized)
                        .or_default()
                        .insert(identity.principal_id.clone());
                }
            }
        }
        for alias in self.store().active_aliases(group)? {
            let normalized = normalize_name(&alias.alias_name);
            if !normalized.is_empty() {
                owners
                    .entry(normalized)
                    .or_default()
                    .insert(alias.principal_id.clone());
            }
        }
        Ok(owners)
    }

    fn should_alert(&self, key: &str, now: Timestamp) -> Result<bool, GateError> {
        match self.store().get_throttle(&self.params().group, key)? {
            Some(last) => Ok(last.has_expired(self.params().alert_throttle_ms, now)),
            None => Ok(true),
        }
    }

    /// Throttle keys whose issue was not reported this pass: notify once
    /// that the issue cleared, then forget the key.
    async fn resolve_stale_issues(
        &self,
        open_issues: &HashSet<String>,
        stats: &mut HealthStats,
    ) -> Result<(), GateError> {
        let group = &self.params().group;
        for prefix in [MISSING_PREFIX, DUPLICATE_PREFIX] {
            for (key, _) in self.store().throttles_with_prefix(group, prefix)? {
                if open_issues.contains(&key) {
                    continue;
                }
                self.notify(
                    Notification::new("Registry issue resolved", "The condition below is no longer present.", COLOR_RESOLVED)
                        .field("Issue", &key, false),
                )
                .await;
                self.store().delete_throttle(group, &key)?;
                if let Some(name) = key.strip_prefix(DUPLICATE_PREFIX) {
                    self.store()
                        .delete_throttle(group, &format!("{DUPLICATE_DM_PREFIX}{name}"))?;
                }
                stats.resolved += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use warden_platform::{NullPlatform, Principal, Tag};
    use warden_store::registry::{ProtectedAlias, ProtectedIdentity};
    use warden_store::MemoryStore;
    use warden_types::{GroupId, TagId};

    use crate::GateParams;

    const HOUR_MS: u64 = 60 * 60 * 1000;

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
        p.protected_tags = vec![TagId::new("staff")];
        p.alert_throttle_ms = 4 * HOUR_MS;
        p
    }

    fn staff(id: &str, name: &str) -> Principal {
        Principal {
            id: PrincipalId::new(id),
            display_name: name.to_string(),
            is_bot: false,
            tags: vec![Tag {
                id: TagId::new("staff"),
                priority: 50,
                managed: false,
            }],
        }
    }

    fn identity(id: &str, name: Option<&str>) -> ProtectedIdentity {
        ProtectedIdentity {
            principal_id: PrincipalId::new(id),
            current_name: name.map(str::to_string),
            active: true,
            added_by: None,
            notes: None,
            created_at: ts(0),
            updated_at: ts(0),
        }
    }

    fn fixture() -> (Arc<NullPlatform>, Arc<MemoryStore>, VerificationGate<NullPlatform, MemoryStore>) {
        let platform = Arc::new(NullPlatform::new());
        let store = Arc::new(MemoryStore::new());
        let gate = VerificationGate::new(platform.clone(), store.clone(), params());
        (platform, store, gate)
    }

    #[tokio::test]
    async fn unregistered_staff_alerts_once_per_window() {
        let (platform, _store, gate) = fixture();
        platform.insert_principal(group(), staff("50", "Moderator"));

        let stats = gate.run_registry_health_cycle(ts(0)).await.unwrap();
        assert_eq!(stats.alerts_sent, 1);
        assert_eq!(stats.open_issues, 1);
        assert_eq!(
            platform.notifications()[0].title,
            "Protected member not registered"
        );

        // Within the 4h window: issue still open, no new alert.
        let stats = gate.run_registry_health_cycle(ts(HOUR_MS)).await.unwrap();
        assert_eq!(stats.alerts_sent, 0);
        assert_eq!(stats.open_issues, 1);

        // Window elapsed: alert repeats.
        let stats = gate.run_registry_health_cycle(ts(5 * HOUR_MS)).await.unwrap();
        assert_eq!(stats.alerts_sent, 1);
    }

    #[tokio::test]
    async fn registering_the_member_resolves_exactly_once() {
        let (platform, store, gate) = fixture();
        platform.insert_principal(group(), staff("50", "Moderator"));

        gate.run_registry_health_cycle(ts(0)).await.unwrap();
        store.upsert_identity(&group(), identity("50", Some("Moderator"))).unwrap();

        let stats = gate.run_registry_health_cycle(ts(HOUR_MS)).await.unwrap();
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.open_issues, 0);
        let resolved: Vec<_> = platform
            .notifications()
            .into_iter()
            .filter(|n| n.title == "Registry issue resolved")
            .collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].fields[0].value, "missing:50");

        // A later pass stays quiet.
        let stats = gate.run_registry_health_cycle(ts(2 * HOUR_MS)).await.unwrap();
        assert_eq!((stats.alerts_sent, stats.resolved), (0, 0));
    }

    #[tokio::test]
    async fn duplicate_names_alert_and_dm_both_holders() {
        let (platform, store, gate) = fixture();
        store.upsert_identity(&group(), identity("1", Some("Founder"))).unwrap();
        store.upsert_identity(&group(), identity("2", Some("  founder "))).unwrap();

        let stats = gate.run_registry_health_cycle(ts(0)).await.unwrap();

        assert_eq!(stats.alerts_sent, 1);
        assert_eq!(stats.dms_sent, 2);
        assert_eq!(stats.open_issues, 1);
        assert_eq!(platform.notifications()[0].title, "Protected name conflict");
        let dm_targets: BTreeSet<PrincipalId> = platform
            .direct_messages()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(
            dm_targets,
            BTreeSet::from([PrincipalId::new("1"), PrincipalId::new("2")])
        );

        // DMs are throttled independently per name.
        let stats = gate.run_registry_health_cycle(ts(HOUR_MS)).await.unwrap();
        assert_eq!(stats.dms_sent, 0);
    }

    #[tokio::test]
    async fn alias_collision_counts_as_duplicate() {
        let (_platform, store, gate) = fixture();
        store.upsert_identity(&group(), identity("1", Some("Founder"))).unwrap();
        store
            .upsert_alias(
                &group(),
                ProtectedAlias {
                    principal_id: PrincipalId::new("2"),
                    alias_name: "FOUNDER".into(),
                    active: true,
                },
            )
            .unwrap();

        let stats = gate.run_registry_health_cycle(ts(0)).await.unwrap();
        assert_eq!(stats.open_issues, 1);
    }

    #[tokio::test]
    async fn own_alias_is_not_a_conflict() {
        let (_platform, store, gate) = fixture();
        store.upsert_identity(&group(), identity("1", Some("Founder"))).unwrap();
        store
            .upsert_alias(
                &group(),
                ProtectedAlias {
                    principal_id: PrincipalId::new("1"),
                    alias_name: "founder".into(),
                    active: true,
                },
            )
            .unwrap();

        let stats = gate.run_registry_health_cycle(ts(0)).await.unwrap();
        assert_eq!(stats.open_issues, 0);
    }

    #[tokio::test]
    async fn duplicate_resolution_clears_dm_throttle_too() {
        let (_platform, store, gate) = fixture();
        store.upsert_identity(&group(), identity("1", Some("Founder"))).unwrap();
        store.upsert_identity(&group(), identity("2", Some("founder"))).unwrap();

        gate.run_registry_health_cycle(ts(0)).await.unwrap();
        store
            .set_identity_active(&group(), &PrincipalId::new("2"), false, ts(1))
            .unwrap();

        let stats = gate.run_registry_health_cycle(ts(HOUR_MS)).await.unwrap();
        assert_eq!(stats.resolved, 1);
        assert!(store
            .throttles_with_prefix(&group(), "duplicate")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn name_refresh_prefers_member_view_and_falls_back() {
        let (platform, store, gate) = fixture();
        // "1" is in the group; "2" left but still has a global name.
        platform.insert_principal(group(), staff("1", "New Nickname"));
        platform.set_global_name(PrincipalId::new("2"), "Global Name");
        store.upsert_identity(&group(), identity("1", Some("Old Nickname"))).unwrap();
        store.upsert_identity(&group(), identity("2", None)).unwrap();

        let stats = gate.run_registry_health_cycle(ts(10)).await.unwrap();

        assert_eq!(stats.names_refreshed, 2);
        assert_eq!(
            store
                .get_identity(&group(), &PrincipalId::new("1"))
                .unwrap()
                .unwrap()
                .current_name
                .as_deref(),
            Some("New Nickname")
        );
        assert_eq!(
            store
                .get_identity(&group(), &PrincipalId::new("2"))
                .unwrap()
                .unwrap()
                .current_name
                .as_deref(),
            Some("Global Name")
        );
    }
}
