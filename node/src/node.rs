//! The running warden service.
//!
//! Owns the gate core plus the background timers: the reconciliation
//! poller, the registry health sweep, and moderation-log retention.
//! Inbound platform events are dispatched through [`WardenNode::handle_event`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use warden_gate::{
    CycleStats, GateError, HealthStats, JoinOutcome, NameChangeOutcome, TagChangeOutcome,
    VerificationGate,
};
use warden_platform::{Event, Platform};
use warden_store::{ModerationLogStore, Store, VerificationStore};
use warden_types::{GroupId, Timestamp};

use crate::config::NodeConfig;
use crate::metrics::GateMetrics;
use crate::shutdown::ShutdownController;
use crate::NodeError;

const LOG_TRIM_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

pub struct WardenNode<P, S> {
    config: NodeConfig,
    group: GroupId,
    gate: Arc<VerificationGate<P, S>>,
    store: Arc<S>,
    metrics: Arc<GateMetrics>,
    shutdown: ShutdownController,
    reconcile_guard: Arc<Mutex<()>>,
    health_guard: Arc<Mutex<()>>,
}

impl<P, S> std::fmt::Debug for WardenNode<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenNode")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl<P, S> WardenNode<P, S>
where
    P: Platform + 'static,
    S: Store + Send + Sync + 'static,
{
    pub fn new(platform: Arc<P>, store: Arc<S>, config: NodeConfig) -> Result<Self, NodeError> {
        let params = config.gate_params()?;
        let group = params.group.clone();
        let gate = Arc::new(VerificationGate::new(platform, store.clone(), params));
        Ok(Self {
            config,
            group,
            gate,
            store,
            metrics: Arc::new(GateMetrics::new()),
            shutdown: ShutdownController::new(),
            reconcile_guard: Arc::new(Mutex::new(())),
            health_guard: Arc::new(Mutex::new(())),
        })
    }

    pub fn gate(&self) -> &Arc<VerificationGate<P, S>> {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<GateMetrics> {
        &self.metrics
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Spawn the background timers. Tokio intervals fire immediately, so
    /// both the reconciliation pass and the registry sweep run once at
    /// startup before settling into their periods.
    pub fn start(&self) {
        self.spawn_reconcile_loop();
        self.spawn_health_loop();
        self.spawn_log_trim_loop();
        info!(
            group = %self.group,
            poll_secs = self.config.poll_interval_secs,
            health_secs = self.config.health_interval_secs,
            "warden node started"
        );
    }

    /// Signal shutdown and wait for every background task to finish.
    pub async fn stop(&self) {
        self.shutdown.drain().await;
        info!("warden node stopped");
    }

    /// Run one reconciliation pass now. Returns `None` when a pass is
    /// already in flight.
    pub async fn run_reconcile_once(&self, now: Timestamp) -> Option<Result<CycleStats, GateError>> {
        reconcile_pass(
            &self.gate,
            &self.store,
            &self.metrics,
            &self.group,
            &self.reconcile_guard,
            now,
        )
        .await
    }

    /// Run one registry health pass now. Returns `None` when a pass is
    /// already in flight.
    pub async fn run_health_once(&self, now: Timestamp) -> Option<Result<HealthStats, GateError>> {
        health_pass(&self.gate, &self.metrics, &self.health_guard, now).await
    }

    /// Dispatch one inbound platform event to the gate.
    pub async fn handle_event(&self, event: Event) {
        let now = Timestamp::now();
        match event {
            Event::PrincipalJoined { group, principal } => {
                if group != self.group {
                    debug!(%group, "event for unmonitored group ignored");
                    return;
                }
                match self.gate.on_join(&principal, now).await {
                    Ok(JoinOutcome::Probation) => self.metrics.joins.inc(),
                    Ok(JoinOutcome::Interred) => self.metrics.interments.inc(),
                    Ok(_) => {}
                    Err(e) => warn!(principal = %principal.id, error = %e, "join handling failed"),
                }
            }
            Event::TagsChanged { group, before, after } => {
                if group != self.group {
                    return;
                }
                match self.gate.on_tag_change(&before, &after, now).await {
                    Ok(TagChangeOutcome::Verified) => self.metrics.verifications.inc(),
                    Ok(_) => {}
                    Err(e) => warn!(principal = %after.id, error = %e, "tag change handling failed"),
                }
            }
            Event::PrincipalRemoved { group, principal_id, kind } => {
                if group != self.group {
                    return;
                }
                if let Err(e) = self
                    .gate
                    .on_external_termination(&principal_id, kind, now)
                    .await
                {
                    warn!(principal = %principal_id, error = %e, "termination handling failed");
                }
            }
            Event::DisplayNameChanged { group, principal_id, new_name, .. } => {
                if group != self.group {
                    return;
                }
                match self
                    .gate
                    .on_display_name_change(&principal_id, &new_name, now)
                    .await
                {
                    Ok(NameChangeOutcome::Interred) => self.metrics.interments.inc(),
                    Ok(_) => {}
                    Err(e) => warn!(principal = %principal_id, error = %e, "name change handling failed"),
                }
            }
        }
    }

    fn spawn_reconcile_loop(&self) {
        let gate = self.gate.clone();
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let group = self.group.clone();
        let guard = self.reconcile_guard.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let period = Duration::from_secs(self.config.poll_interval_secs);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("reconcile task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match reconcile_pass(&gate, &store, &metrics, &group, &guard, Timestamp::now()).await {
                            Some(Err(e)) => warn!(error = %e, "reconcile cycle failed"),
                            Some(Ok(_)) | None => {}
                        }
                    }
                }
            }
        });
        self.shutdown.register(handle);
    }

    fn spawn_health_loop(&self) {
        let gate = self.gate.clone();
        let metrics = self.metrics.clone();
        let guard = self.health_guard.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let period = Duration::from_secs(self.config.health_interval_secs);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("registry health task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match health_pass(&gate, &metrics, &guard, Timestamp::now()).await {
                            Some(Err(e)) => warn!(error = %e, "registry health cycle failed"),
                            Some(Ok(_)) | None => {}
                        }
                    }
                }
            }
        });
        self.shutdown.register(handle);
    }

    fn spawn_log_trim_loop(&self) {
        let store = self.store.clone();
        let group = self.group.clone();
        let retention_ms = self.config.log_retention_days * DAY_MS;
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(LOG_TRIM_PERIOD);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("log retention task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let cutoff = Timestamp::new(
                            Timestamp::now().as_millis().saturating_sub(retention_ms),
                        );
                        match store.trim_log_before(&group, cutoff) {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "trimmed aged moderation log entries"),
                            Err(e) => warn!(error = %e, "log retention trim failed"),
                        }
                    }
                }
            }
        });
        self.shutdown.register(handle);
    }
}

/// One guarded reconciliation pass. `None` means a pass was already
/// holding the guard (overlap protection).
async fn reconcile_pass<P: Platform, S: Store>(
    gate: &VerificationGate<P, S>,
    store: &S,
    metrics: &GateMetrics,
    group: &GroupId,
    guard: &Mutex<()>,
    now: Timestamp,
) -> Option<Result<CycleStats, GateError>> {
    let Ok(_lock) = guard.try_lock() else {
        debug!("reconcile pass already running, skipping tick");
        return None;
    };
    let started = std::time::Instant::now();
    let result = gate.run_reconcile_cycle(now).await;
    if let Ok(stats) = &result {
        metrics.record_cycle(stats, started.elapsed().as_secs_f64() * 1_000.0);
        match store.pending_count(group) {
            Ok(pending) => metrics.pending_principals.set(pending as i64),
            Err(e) => warn!(error = %e, "pending count unavailable"),
        }
    }
    Some(result)
}

async fn health_pass<P: Platform, S: Store>(
    gate: &VerificationGate<P, S>,
    metrics: &GateMetrics,
    guard: &Mutex<()>,
    now: Timestamp,
) -> Option<Result<HealthStats, GateError>> {
    let Ok(_lock) = guard.try_lock() else {
        debug!("registry health pass already running, skipping tick");
        return None;
    };
    let result = gate.run_registry_health_cycle(now).await;
    if let Ok(stats) = &result {
        metrics.record_health(stats);
    }
    Some(result)
}
