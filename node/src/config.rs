//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use warden_gate::GateParams;
use warden_types::{GroupId, PrincipalId, TagId};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a warden node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). The group and tag identifiers
/// have no usable defaults; [`NodeConfig::validate`] rejects a config
/// that leaves them empty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identifier of the monitored group.
    #[serde(default)]
    pub group_id: String,

    /// Tag marking a fully admitted principal.
    #[serde(default)]
    pub verified_tag: String,

    /// Tag marking a contained principal.
    #[serde(default)]
    pub restricted_tag: String,

    /// Tag granted while verification is pending.
    #[serde(default)]
    pub provisional_tag: String,

    /// Managed tag applied to bot accounts.
    #[serde(default)]
    pub automata_tag: String,

    /// Tags whose holders are protected (registry coverage, exemptions).
    #[serde(default)]
    pub protected_tags: Vec<String>,

    /// Principal ids always exempt from the impersonation check.
    #[serde(default)]
    pub protected_principals: Vec<String>,

    /// Data directory for the LMDB store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How long a joiner has to verify, in seconds.
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    /// Reconciliation poll interval, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Registry health sweep interval, in seconds.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Poller suppression window after real-time finalization, seconds.
    #[serde(default = "default_suppression_secs")]
    pub suppression_secs: u64,

    /// Minimum gap between repeated registry alerts, in hours.
    #[serde(default = "default_alert_throttle_hours")]
    pub alert_throttle_hours: u64,

    /// Moderation log retention, in days.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to enable the Prometheus metrics registry.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./warden_data")
}

fn default_verify_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_health_interval_secs() -> u64 {
    900
}

fn default_suppression_secs() -> u64 {
    120
}

fn default_alert_throttle_hours() -> u64 {
    4
}

fn default_log_retention_days() -> u64 {
    30
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// Reject configs missing required identifiers.
    pub fn validate(&self) -> Result<(), NodeError> {
        let required = [
            ("group_id", &self.group_id),
            ("verified_tag", &self.verified_tag),
            ("restricted_tag", &self.restricted_tag),
            ("provisional_tag", &self.provisional_tag),
            ("automata_tag", &self.automata_tag),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(NodeError::Config(format!("{field} must be set")));
            }
        }
        if self.verify_timeout_secs == 0 {
            return Err(NodeError::Config("verify_timeout_secs must be nonzero".into()));
        }
        if self.poll_interval_secs == 0 || self.health_interval_secs == 0 {
            return Err(NodeError::Config("poll intervals must be nonzero".into()));
        }
        self.log_format.parse::<LogFormat>()?;
        Ok(())
    }

    /// Translate into the gate's parameter struct.
    pub fn gate_params(&self) -> Result<GateParams, NodeError> {
        self.validate()?;
        let mut params = GateParams::new(
            GroupId::new(self.group_id.clone()),
            TagId::new(self.verified_tag.clone()),
            TagId::new(self.restricted_tag.clone()),
            TagId::new(self.provisional_tag.clone()),
            TagId::new(self.automata_tag.clone()),
        );
        params.protected_tags = self
            .protected_tags
            .iter()
            .map(|t| TagId::new(t.as_str()))
            .collect();
        params.protected_principals = self
            .protected_principals
            .iter()
            .map(|p| PrincipalId::new(p.as_str()))
            .collect();
        params.verify_timeout_ms = self.verify_timeout_secs * 1_000;
        params.poll_interval_ms = self.poll_interval_secs * 1_000;
        params.suppression_ms = self.suppression_secs * 1_000;
        params.alert_throttle_ms = self.alert_throttle_hours * 60 * 60 * 1_000;
        Ok(params)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            group_id: String::new(),
            verified_tag: String::new(),
            restricted_tag: String::new(),
            provisional_tag: String::new(),
            automata_tag: String::new(),
            protected_tags: Vec::new(),
            protected_principals: Vec::new(),
            data_dir: default_data_dir(),
            verify_timeout_secs: default_verify_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            health_interval_secs: default_health_interval_secs(),
            suppression_secs: default_suppression_secs(),
            alert_throttle_hours: default_alert_throttle_hours(),
            log_retention_days: default_log_retention_days(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}
