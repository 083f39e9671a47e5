//! Fundamental types shared across the warden workspace.
//!
//! Everything here is deliberately free of business logic: identifiers,
//! timestamps, and the display-name normalization rule that the
//! impersonation detector and the registry health sweep must agree on.

pub mod id;
pub mod name;
pub mod time;

pub use id::{GroupId, PrincipalId, TagId};
pub use name::normalize_name;
pub use time::Timestamp;
