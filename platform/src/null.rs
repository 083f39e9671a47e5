//! Deterministic in-memory platform for tests.
//!
//! Follows the nullable-infrastructure pattern: scripted state, no
//! network, every outbound side effect recorded for assertion. Mutations
//! (tag changes, removals) are applied to the scripted state so a
//! subsequent fetch observes them, just like the real platform would.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use warden_types::{GroupId, PrincipalId, TagId};

use crate::error::PlatformError;
use crate::notification::Notification;
use crate::platform::{Platform, RemovalSeverity};
use crate::principal::{Principal, Tag};

/// A recorded removal call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovalCall {
    pub principal: PrincipalId,
    pub severity: RemovalSeverity,
    pub reason: String,
}

#[derive(Default)]
struct Inner {
    principals: HashMap<(GroupId, PrincipalId), Principal>,
    global_names: HashMap<PrincipalId, String>,
    tag_catalog: HashMap<TagId, Tag>,
    fail_fetch: HashSet<PrincipalId>,
    fail_removal: HashSet<PrincipalId>,
    fail_tag_mutation: bool,
    removals: Vec<RemovalCall>,
    notifications: Vec<Notification>,
    directs: Vec<(PrincipalId, Notification)>,
}

/// Scriptable platform double.
#[derive(Default)]
pub struct NullPlatform {
    inner: Mutex<Inner>,
}

impl NullPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag so `add_tag`/`set_tags` know its priority and
    /// managed flag.
    pub fn define_tag(&self, tag: Tag) {
        self.inner
            .lock()
            .unwrap()
            .tag_catalog
            .insert(tag.id.clone(), tag);
    }

    pub fn insert_principal(&self, group: GroupId, principal: Principal) {
        self.inner
            .lock()
            .unwrap()
            .principals
            .insert((group, principal.id.clone()), principal);
    }

    pub fn set_global_name(&self, principal: PrincipalId, name: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .global_names
            .insert(principal, name.into());
    }

    /// Make `fetch_principal` fail with a transient error for this id.
    pub fn fail_fetch(&self, principal: PrincipalId) {
        self.inner.lock().unwrap().fail_fetch.insert(principal);
    }

    pub fn clear_fetch_failure(&self, principal: &PrincipalId) {
        self.inner.lock().unwrap().fail_fetch.remove(principal);
    }

    /// Make `remove_principal` fail with a transient error for this id.
    pub fn fail_removal(&self, principal: PrincipalId) {
        self.inner.lock().unwrap().fail_removal.insert(principal);
    }

    /// Make every tag mutation fail with a transient error.
    pub fn fail_tag_mutations(&self, fail: bool) {
        self.inner.lock().unwrap().fail_tag_mutation = fail;
    }

    pub fn removals(&self) -> Vec<RemovalCall> {
        self.inner.lock().unwrap().removals.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    pub fn direct_messages(&self) -> Vec<(PrincipalId, Notification)> {
        self.inner.lock().unwrap().directs.clone()
    }

    /// Current scripted tag set for a principal (post-mutation view).
    pub fn tags_of(&self, group: &GroupId, principal: &PrincipalId) -> Option<Vec<TagId>> {
        let inner = self.inner.lock().unwrap();
        inner
            .principals
            .get(&(group.clone(), principal.clone()))
            .map(|p| p.tags.iter().map(|t| t.id.clone()).collect())
    }

    fn resolve_tag(inner: &Inner, id: &TagId) -> Tag {
        inner.tag_catalog.get(id).cloned().unwrap_or(Tag {
            id: id.clone(),
            priority: 0,
            managed: false,
        })
    }
}

impl Platform for NullPlatform {
    async fn fetch_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> Result<Principal, PlatformError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_fetch.contains(principal) {
            return Err(PlatformError::Transient("scripted fetch failure".into()));
        }
        inner
            .principals
            .get(&(group.clone(), principal.clone()))
            .cloned()
            .ok_or(PlatformError::NotFound)
    }

    async fn lookup_display_name(
        &self,
        principal: &PrincipalId,
    ) -> Result<String, PlatformError> {
        let inner = self.inner.lock().unwrap();
        inner
            .global_names
            .get(principal)
            .cloned()
            .ok_or(PlatformError::NotFound)
    }

    async fn list_principals(&self, group: &GroupId) -> Result<Vec<Principal>, PlatformError> {
        let inner = self.inner.lock().unwrap();
        let mut members: Vec<Principal> = inner
            .principals
            .iter()
            .filter(|((g, _), _)| g == group)
            .map(|(_, p)| p.clone())
            .collect();
        members.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(members)
    }

    async fn set_tags(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        tags: &[TagId],
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_tag_mutation {
            return Err(PlatformError::Transient("scripted tag failure".into()));
        }
        let resolved: Vec<Tag> = tags.iter().map(|t| Self::resolve_tag(&inner, t)).collect();
        match inner.principals.get_mut(&(group.clone(), principal.clone())) {
            Some(p) => {
                p.tags = resolved;
                Ok(())
            }
            None => Err(PlatformError::NotFound),
        }
    }

    async fn add_tag(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        tag: &TagId,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_tag_mutation {
            return Err(PlatformError::Transient("scripted tag failure".into()));
        }
        let resolved = Self::resolve_tag(&inner, tag);
        match inner.principals.get_mut(&(group.clone(), principal.clone())) {
            Some(p) => {
                if !p.has_tag(tag) {
                    p.tags.push(resolved);
                }
                Ok(())
            }
            None => Err(PlatformError::NotFound),
        }
    }

    async fn remove_tags(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        tags: &[TagId],
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_tag_mutation {
            return Err(PlatformError::Transient("scripted tag failure".into()));
        }
        match inner.principals.get_mut(&(group.clone(), principal.clone())) {
            Some(p) => {
                p.tags.retain(|t| !tags.contains(&t.id));
                Ok(())
            }
            None => Err(PlatformError::NotFound),
        }
    }

    async fn remove_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        severity: RemovalSeverity,
        reason: &str,
        _purge_recent_content: bool,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_removal.contains(principal) {
            return Err(PlatformError::Transient("scripted removal failure".into()));
        }
        inner.principals.remove(&(group.clone(), principal.clone()));
        inner.removals.push(RemovalCall {
            principal: principal.clone(),
            severity,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn send_notification(
        &self,
        _group: &GroupId,
        notification: Notification,
    ) -> Result<(), PlatformError> {
        self.inner.lock().unwrap().notifications.push(notification);
        Ok(())
    }

    async fn send_direct(
        &self,
        principal: &PrincipalId,
        notification: Notification,
    ) -> Result<(), PlatformError> {
        self.inner
            .lock()
            .unwrap()
            .directs
            .push((principal.clone(), notification));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    fn member(id: &str) -> Principal {
        Principal {
            id: PrincipalId::new(id),
            display_name: id.to_string(),
            is_bot: false,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn fetch_unknown_is_not_found() {
        let platform = NullPlatform::new();
        let err = platform
            .fetch_principal(&group(), &PrincipalId::new("1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn removal_is_recorded_and_principal_disappears() {
        let platform = NullPlatform::new();
        platform.insert_principal(group(), member("1"));

        platform
            .remove_principal(&group(), &PrincipalId::new("1"), RemovalSeverity::Soft, "r", false)
            .await
            .unwrap();

        assert_eq!(platform.removals().len(), 1);
        assert!(platform
            .fetch_principal(&group(), &PrincipalId::new("1"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn set_tags_uses_catalog_priorities() {
        let platform = NullPlatform::new();
        platform.define_tag(Tag {
            id: TagId::new("verified"),
            priority: 5,
            managed: false,
        });
        platform.insert_principal(group(), member("1"));

        platform
            .set_tags(&group(), &PrincipalId::new("1"), &[TagId::new("verified")], "r")
            .await
            .unwrap();

        let fetched = platform
            .fetch_principal(&group(), &PrincipalId::new("1"))
            .await
            .unwrap();
        assert_eq!(fetched.tags[0].priority, 5);
    }

    #[tokio::test]
    async fn scripted_fetch_failure_is_transient() {
        let platform = NullPlatform::new();
        platform.insert_principal(group(), member("1"));
        platform.fail_fetch(PrincipalId::new("1"));

        let err = platform
            .fetch_principal(&group(), &PrincipalId::new("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Transient(_)));

        platform.clear_fetch_failure(&PrincipalId::new("1"));
        assert!(platform
            .fetch_principal(&group(), &PrincipalId::new("1"))
            .await
            .is_ok());
    }
}
