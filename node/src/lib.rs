//! Service layer for the warden admission gate.
//!
//! Wires the gate core to a runtime: configuration, logging, Prometheus
//! metrics, graceful shutdown, the periodic reconciliation and registry
//! health timers, and dispatch of inbound platform events.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::GateMetrics;
pub use node::WardenNode;
pub use shutdown::ShutdownController;
