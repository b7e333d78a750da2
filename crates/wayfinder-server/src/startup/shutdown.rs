//! Graceful shutdown handling for the Wayfinder launcher

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};
use wayfinder_discovery::ServiceDiscovery;

/// Shutdown signal sender and receiver
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Spawn the Ctrl+C / SIGTERM listener
///
/// Returns the shutdown signal it fires
pub fn listen_for_shutdown_signal() -> ShutdownSignal {
    let shutdown = ShutdownSignal::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c() => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
        shutdown_clone.shutdown();
    });

    shutdown
}

/// Close the discovery instance, giving up after `timeout`
///
/// Returns `false` when the close did not finish in time.
pub async fn close_with_timeout(discovery: &ServiceDiscovery, timeout: Duration) -> bool {
    info!("Shutdown initiated, waiting up to {:?} for bridges to stop...", timeout);

    match tokio::time::timeout(timeout, discovery.close()).await {
        Ok(()) => {
            info!("Shutdown complete");
            true
        }
        Err(_) => {
            warn!("Shutdown timed out after {:?}", timeout);
            false
        }
    }
}
