//! FileIntegrity Status Controller
//!
//! Folds the scan reports uploaded by the node daemons into per-node
//! status objects, aggregates them into each FileIntegrity's phase and
//! holds scans off on nodes while the machine-config daemon updates them.

mod client;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use config::ControllerConfig;
use controller::Controller;
use kube::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting FileIntegrity status controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Metrics address: {}", config.metrics_addr);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }
    let client = Client::try_default()
        .await
        .context("creating the Kubernetes client")?;

    Controller::new(&config, client)?.run(shutdown_signal()).await?;

    info!("Status controller stopped");
    Ok(())
}

/// Resolves on SIGTERM or Ctrl-C
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
