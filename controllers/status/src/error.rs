//! Controller-specific error types.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the status controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Metric registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object is missing fields the reconciler relies on
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics endpoint failed
    #[error("Metrics server error: {0}")]
    Server(#[from] std::io::Error),
}
