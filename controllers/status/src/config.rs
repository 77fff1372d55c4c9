//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;

const DEFAULT_NAMESPACE: &str = "file-integrity";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding FileIntegrity objects, their reports and statuses
    pub namespace: String,
    /// Listen address of the metrics and health endpoint
    pub metrics_addr: SocketAddr,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let metrics_addr = get("METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = metrics_addr.parse().map_err(|_| {
            ControllerError::InvalidConfig(format!(
                "METRICS_ADDR must be a socket address, got {metrics_addr:?}"
            ))
        })?;

        Ok(Self {
            namespace: get("WATCH_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            metrics_addr,
        })
    }
}
