//! The platform capability trait.

use std::future::Future;

use warden_types::{GroupId, PrincipalId, TagId};

use crate::error::PlatformError;
use crate::notification::Notification;
use crate::principal::Principal;

/// Removal severity: soft removal is reversible (the principal may
/// rejoin), hard removal is permanent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalSeverity {
    Soft,
    Hard,
}

/// Narrow interface onto the host platform SDK.
///
/// All calls are potentially slow; callers are expected to handle errors
/// per principal so one failure never aborts a batch. Methods return
/// `Send` futures so loops can run on the multi-threaded runtime.
pub trait Platform: Send + Sync {
    /// Fetch the live view of a principal in a group.
    fn fetch_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> impl Future<Output = Result<Principal, PlatformError>> + Send;

    /// Lighter-weight identity lookup that does not require group
    /// membership (fallback when the member fetch fails).
    fn lookup_display_name(
        &self,
        principal: &PrincipalId,
    ) -> impl Future<Output = Result<String, PlatformError>> + Send;

    /// Enumerate all principals currently in the group.
    fn list_principals(
        &self,
        group: &GroupId,
    ) -> impl Future<Output = Result<Vec<Principal>, PlatformError>> + Send;

    /// Replace a principal's full tag set.
    fn set_tags(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        tags: &[TagId],
        reason: &str,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Add a single tag, leaving the rest untouched.
    fn add_tag(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        tag: &TagId,
        reason: &str,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Remove a set of tags, leaving the rest untouched.
    fn remove_tags(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        tags: &[TagId],
        reason: &str,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Remove a principal from the group.
    fn remove_principal(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        severity: RemovalSeverity,
        reason: &str,
        purge_recent_content: bool,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Best-effort admin notification; failures are logged, not retried.
    fn send_notification(
        &self,
        group: &GroupId,
        notification: Notification,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Best-effort direct message to a principal.
    fn send_direct(
        &self,
        principal: &PrincipalId,
        notification: Notification,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;
}
