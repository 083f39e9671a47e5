//! Admission-control core.
//!
//! [`VerificationGate`] owns the verification state machine, the
//! impersonation detector, the deadline reconciliation cycle, and the
//! protected-registry health cycle. It talks to the outside world only
//! through the `warden-platform` trait and the `warden-store` traits, so
//! the whole core runs deterministically against the test doubles.

pub mod error;
pub mod gate;
pub mod impersonation;
pub mod params;
pub mod reconcile;
pub mod registry_health;
pub mod suppress;

pub use error::GateError;
pub use gate::{JoinOutcome, NameChangeOutcome, TagChangeOutcome, VerificationGate};
pub use params::GateParams;
pub use reconcile::CycleStats;
pub use registry_health::HealthStats;
pub use suppress::SuppressionWindow;
