//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! On shutdown, pending jobs are cancelled and the running job is signalled.
//! The running job gets a bounded grace period to settle its in-flight batch
//! and record its outcome.

use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::queue::TransferQueue;

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            grace_period,
        }
    }

    /// Get a shutdown receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Wait for shutdown signal (SIGTERM or SIGINT)
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.trigger();
    }

    /// Broadcast the shutdown signal to all subscribers
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to broadcast shutdown signal: {}", e);
        }
    }

    /// Cancel queued work and wait for the running job to settle
    pub async fn shutdown(&self, queue: &TransferQueue) {
        info!("Graceful shutdown initiated");

        let summary = queue.clear_queue().await;
        if summary.running > 0 {
            info!("Waiting up to {:?} for the running job to stop", self.grace_period);
        }

        match tokio::time::timeout(self.grace_period, queue.wait_until_idle()).await {
            Ok(()) => info!("Graceful shutdown complete"),
            Err(_) => warn!("Running job did not stop within {:?}", self.grace_period),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
