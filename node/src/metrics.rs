//! Prometheus metrics for the warden node.
//!
//! Covers admission activity (joins, verifications, removals), the
//! impersonation detector, and the registry health sweep. The
//! [`GateMetrics`] struct owns a dedicated [`Registry`] that an exporter
//! can encode into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

use warden_gate::{CycleStats, HealthStats};

/// Central collection of node-level Prometheus metrics.
pub struct GateMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Principals that entered a probation window.
    pub joins: IntCounter,
    /// Records finalized as verified (events and reconciliation).
    pub verifications: IntCounter,
    /// Expired principals soft-removed by the poller.
    pub kicks: IntCounter,
    /// Expired principals hard-removed by the poller.
    pub bans: IntCounter,
    /// Principals contained by the impersonation detector.
    pub interments: IntCounter,
    /// Registry health alerts sent (after throttling).
    pub registry_alerts: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Records currently in `Pending`.
    pub pending_principals: IntGauge,
    /// Registry issues open as of the last health sweep.
    pub registry_issues: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of one reconciliation pass, in milliseconds.
    pub reconcile_cycle_ms: Histogram,
}

impl GateMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let joins = register_int_counter_with_registry!(
            Opts::new("warden_joins_total", "Principals that entered probation"),
            registry
        )
        .expect("failed to register joins counter");

        let verifications = register_int_counter_with_registry!(
            Opts::new("warden_verifications_total", "Records finalized as verified"),
            registry
        )
        .expect("failed to register verifications counter");

        let kicks = register_int_counter_with_registry!(
            Opts::new("warden_kicks_total", "Expired principals soft-removed"),
            registry
        )
        .expect("failed to register kicks counter");

        let bans = register_int_counter_with_registry!(
            Opts::new("warden_bans_total", "Expired principals hard-removed"),
            registry
        )
        .expect("failed to register bans counter");

        let interments = register_int_counter_with_registry!(
            Opts::new(
                "warden_interments_total",
                "Principals contained by the impersonation detector"
            ),
            registry
        )
        .expect("failed to register interments counter");

        let registry_alerts = register_int_counter_with_registry!(
            Opts::new("warden_registry_alerts_total", "Registry health alerts sent"),
            registry
        )
        .expect("failed to register registry_alerts counter");

        let pending_principals = register_int_gauge_with_registry!(
            Opts::new("warden_pending_principals", "Records currently pending"),
            registry
        )
        .expect("failed to register pending_principals gauge");

        let registry_issues = register_int_gauge_with_registry!(
            Opts::new("warden_registry_issues", "Registry issues currently open"),
            registry
        )
        .expect("failed to register registry_issues gauge");

        let reconcile_cycle_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "warden_reconcile_cycle_ms",
                "Reconciliation pass duration in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register reconcile_cycle_ms histogram");

        Self {
            registry,
            joins,
            verifications,
            kicks,
            bans,
            interments,
            registry_alerts,
            pending_principals,
            registry_issues,
            reconcile_cycle_ms,
        }
    }

    /// Fold one reconciliation pass into the counters.
    pub fn record_cycle(&self, stats: &CycleStats, elapsed_ms: f64) {
        self.verifications.inc_by(stats.verified);
        self.kicks.inc_by(stats.kicked);
        self.bans.inc_by(stats.banned);
        self.reconcile_cycle_ms.observe(elapsed_ms);
    }

    /// Fold one registry health pass into the counters.
    pub fn record_health(&self, stats: &HealthStats) {
        self.registry_alerts.inc_by(stats.alerts_sent);
        self.registry_issues.set(stats.open_issues as i64);
    }
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new()
    }
}
