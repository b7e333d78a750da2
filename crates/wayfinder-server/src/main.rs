//! Main entry point for the Wayfinder discovery server.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use wayfinder_discovery::{BroadcastNotifier, ManagedBridge, ServiceDiscovery};
use wayfinder_server::{
    FileCatalogSource, ServerConfig,
    startup::{self, LoggingConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_args()?;

    let logging_config = LoggingConfig::from_settings(&config.logging);
    let _logging_guard = startup::init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to initialize logging")?;

    info!(
        name = %config.discovery.name,
        backend = ?config.discovery.backend,
        "Starting Wayfinder v{}",
        env!("CARGO_PKG_VERSION")
    );

    let notifier = BroadcastNotifier::default();
    let mut notifications = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => debug!(
                    topic = %notification.topic,
                    payload = %notification.payload,
                    "Notification"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
    let discovery = ServiceDiscovery::from_options(config.discovery.clone(), Arc::new(notifier));

    if let Some(catalog) = &config.catalog {
        let source = FileCatalogSource::new(catalog);
        match discovery
            .register_bridge(source, config.bridge.clone())
            .await
        {
            Ok(bridge) => info!(bridge = %bridge.name(), catalog = %catalog, "Catalog bridge started"),
            Err(e) => {
                error!(catalog = %catalog, "Failed to start catalog bridge: {}", e);
                discovery.close().await;
                return Err(e).context("Catalog bridge failed to start");
            }
        }
    } else {
        info!("No catalog configured, running without bridges");
    }

    let shutdown = startup::listen_for_shutdown_signal();
    let mut shutdown_rx = shutdown.subscribe();
    let _ = shutdown_rx.recv().await;

    startup::close_with_timeout(&discovery, config.shutdown_timeout()).await;
    Ok(())
}
