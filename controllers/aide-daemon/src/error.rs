//! Daemon error types.
//!
//! Every loop returns these to the supervisor; none of them terminate the
//! process on their own.

use aide::AideError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the AIDE daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// AIDE file or subprocess error
    #[error("AIDE error: {0}")]
    Aide(#[from] AideError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Owning FileIntegrity is missing fields the daemon relies on
    #[error("Invalid FileIntegrity instance: {0}")]
    InvalidInstance(String),

    /// Re-initializing the AIDE database failed
    #[error("Error initializing the AIDE DB: {0}")]
    Init(String),

    /// Reading or encoding the AIDE log failed
    #[error("Log collection failed: {0}")]
    Log(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// A worker task panicked or was cancelled unexpectedly
    #[error("Worker task failed: {0}")]
    Task(String),
}
