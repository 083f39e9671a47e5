//! Logging setup for the warden node.
//!
//! When `RUST_LOG` is unset, the filter runs the warden crates at the
//! configured level over a `warn` baseline, so a `debug` gate does not
//! drag every dependency's internals along. `RUST_LOG` replaces the
//! whole filter when present.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::NodeError;

/// Crates whose output follows the configured level; everything else
/// stays at the baseline.
const LEVELED_CRATES: [&str; 3] = ["warden_gate", "warden_node", "warden_daemon"];

/// Output format for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for interactive runs.
    Human,
    /// Newline-delimited JSON for log aggregation pipelines.
    Json,
}

impl FromStr for LogFormat {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(NodeError::Config(format!(
                "log_format must be \"human\" or \"json\", got {other:?}"
            ))),
        }
    }
}

/// Filter directives used when `RUST_LOG` is absent.
fn default_directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for name in LEVELED_CRATES {
        directives.push(',');
        directives.push_str(name);
        directives.push('=');
        directives.push_str(level);
    }
    directives
}

/// Initialise the global tracing subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been set (i.e. this function
/// was called twice in the same process).
pub fn init_logging(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Human => {
            registry.with(fmt::layer().with_target(true)).init();
        }
        LogFormat::Json => {
            registry
                .with(fmt::layer().json().with_current_span(false).with_target(true))
                .init();
        }
    }
}
