//! Shutdown coordination for the warden node's background timers.
//!
//! The controller owns the handles of the tasks it governs: each timer
//! loop registers itself on spawn, and [`drain`](ShutdownController::drain)
//! broadcasts the stop signal and then waits for every registered task
//! to finish. A stopping node therefore never abandons a reconciliation
//! or registry sweep mid-pass.

use std::sync::Mutex;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Place a spawned task under this controller's management. It will
    /// be awaited by [`drain`](Self::drain).
    pub fn register(&self, handle: JoinHandle<()>) {
        self.tasks.lock().unwrap().push(handle);
    }

    /// Trigger shutdown without waiting for the tasks.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger shutdown and wait for every registered task to finish.
    pub async fn drain(&self) {
        self.shutdown();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, stopping warden"); }
            _ = terminate => { tracing::info!("received SIGTERM, stopping warden"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
