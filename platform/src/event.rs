//! Inbound platform events the gate registers against.
//!
//! Delivery is best-effort: the host may drop any of these, which is why
//! the reconciliation loop re-derives state from the store on every pass.

use warden_types::{GroupId, PrincipalId};

use crate::principal::Principal;

/// How a principal was removed from the group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalKind {
    Banned,
    Kicked,
    Left,
}

/// A real-time event reported by the host platform.
#[derive(Clone, Debug)]
pub enum Event {
    PrincipalJoined {
        group: GroupId,
        principal: Principal,
    },
    TagsChanged {
        group: GroupId,
        before: Principal,
        after: Principal,
    },
    PrincipalRemoved {
        group: GroupId,
        principal_id: PrincipalId,
        kind: RemovalKind,
    },
    /// Display-name change, either group-scoped (nickname) or global.
    DisplayNameChanged {
        group: GroupId,
        principal_id: PrincipalId,
        old_name: String,
        new_name: String,
    },
}
