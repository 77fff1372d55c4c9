//! AIDE Daemon
//!
//! Runs on every node selected by a `FileIntegrity`, keeps the AIDE
//! database initialized, runs periodic checks and uploads each result as a
//! temporary ConfigMap for the status controller to pick up.

mod backoff;
mod config;
mod controller;
mod error;
mod log_reader;
mod loops;
mod report;
mod runtime;
mod shutdown;
mod snapshot;

use anyhow::{Context, Result};
use config::DaemonConfig;
use controller::Controller;
use kube::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::from_env()?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting AIDE daemon");
    info!("Configuration:");
    info!("  FileIntegrity: {}/{}", config.namespace, config.owner);
    info!("  Node: {}", config.node_name);
    info!("  Scan interval: {:?}", config.interval);
    info!("  AIDE files: {}", config.paths.file_dir().display());

    if let Some(source) = &config.config_source {
        config::install_aide_config(source, &config.paths.config())?;
    }

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }
    let client = Client::try_default()
        .await
        .context("creating the Kubernetes client")?;

    Controller::new(config, client).run(shutdown_signal()).await?;

    info!("AIDE daemon stopped");
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
