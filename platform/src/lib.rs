//! Capability interface over the host chat platform.
//!
//! The gate core never talks to a platform SDK directly. Everything it
//! needs — member lookup, tag mutation, removal, notifications — goes
//! through the [`Platform`] trait, so the core can be exercised against
//! the deterministic [`NullPlatform`] in tests and adapted to a real SDK
//! in a thin outer layer.

pub mod error;
pub mod event;
pub mod notification;
pub mod null;
pub mod principal;

mod platform;

pub use error::PlatformError;
pub use event::{Event, RemovalKind};
pub use notification::{Notification, NotificationField};
pub use null::{NullPlatform, RemovalCall};
pub use platform::{Platform, RemovalSeverity};
pub use principal::{Principal, Tag};
