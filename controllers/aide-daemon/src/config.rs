//! Daemon configuration.
//!
//! Everything comes from environment variables set on the DaemonSet pod.
//! Parsing goes through a lookup function so tests never have to touch the
//! process environment.

use crate::error::DaemonError;
use aide::{prepare_config, AidePaths};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_FILE_DIR: &str = "/hostroot/etc/kubernetes";
const DEFAULT_RUN_DIR: &str = "/run";
const DEFAULT_CONFIG_DIR: &str = "/tmp";
const DEFAULT_BINARY: &str = "aide";
const DEFAULT_INTERVAL_SECS: u64 = 900;
const DEFAULT_MAX_BACKUPS: usize = 5;

/// Runtime configuration of one daemon instance
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Name of the owning FileIntegrity
    pub owner: String,
    /// Namespace of the owner and of the report ConfigMaps
    pub namespace: String,
    /// Node this pod runs on
    pub node_name: String,
    /// Prefix of the report ConfigMap name
    pub report_prefix: String,
    pub paths: AidePaths,
    /// User supplied aide.conf to rewrite for the host mount
    pub config_source: Option<PathBuf>,
    pub aide_binary: PathBuf,
    /// Time between scans
    pub interval: Duration,
    pub max_backups: usize,
    /// Always compress uploaded logs, whatever their size
    pub compress: bool,
    pub debug: bool,
}

impl DaemonConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, DaemonError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DaemonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let owner = get("AIDE_OWNER").ok_or_else(|| {
            DaemonError::InvalidConfig("AIDE_OWNER environment variable is required".to_string())
        })?;
        let node_name = get("NODE_NAME").ok_or_else(|| {
            DaemonError::InvalidConfig("NODE_NAME environment variable is required".to_string())
        })?;
        let namespace = get("POD_NAMESPACE").or_else(|| get("NAMESPACE")).ok_or_else(|| {
            DaemonError::InvalidConfig(
                "POD_NAMESPACE or NAMESPACE environment variable is required".to_string(),
            )
        })?;

        let interval = match get("AIDE_INTERVAL") {
            Some(v) => parse_number::<u64>("AIDE_INTERVAL", &v)?,
            None => DEFAULT_INTERVAL_SECS,
        };
        if interval == 0 {
            return Err(DaemonError::InvalidConfig(
                "AIDE_INTERVAL must be greater than zero".to_string(),
            ));
        }
        let max_backups = match get("AIDE_MAX_BACKUPS") {
            Some(v) => parse_number::<usize>("AIDE_MAX_BACKUPS", &v)?,
            None => DEFAULT_MAX_BACKUPS,
        };

        let paths = AidePaths::new(
            get("AIDE_FILE_DIR").unwrap_or_else(|| DEFAULT_FILE_DIR.to_string()),
            get("AIDE_RUN_DIR").unwrap_or_else(|| DEFAULT_RUN_DIR.to_string()),
            get("AIDE_CONFIG_DIR").unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string()),
        );

        Ok(Self {
            report_prefix: get("AIDE_REPORT_PREFIX")
                .unwrap_or_else(|| crds::report_prefix(&owner)),
            owner,
            namespace,
            node_name,
            paths,
            config_source: get("AIDE_CONFIG_SOURCE").map(PathBuf::from),
            aide_binary: PathBuf::from(
                get("AIDE_BINARY").unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            ),
            interval: Duration::from_secs(interval),
            max_backups,
            compress: get("AIDE_COMPRESS").is_some_and(|v| parse_bool(&v)),
            debug: get("AIDE_DEBUG").is_some_and(|v| parse_bool(&v)),
        })
    }
}

/// Rewrite the user's aide.conf at `source` into `dest` so that every
/// rule and the database and log locations point under the host mount
pub fn install_aide_config(source: &Path, dest: &Path) -> Result<(), DaemonError> {
    let raw = std::fs::read_to_string(source).map_err(|e| {
        DaemonError::InvalidConfig(format!("reading {}: {e}", source.display()))
    })?;
    let prepared = prepare_config(&raw)?;
    std::fs::write(dest, prepared)
        .map_err(|e| DaemonError::InvalidConfig(format!("writing {}: {e}", dest.display())))?;
    info!("installed AIDE configuration from {} at {}", source.display(), dest.display());
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DaemonError> {
    value
        .trim()
        .parse()
        .map_err(|_| DaemonError::InvalidConfig(format!("{key} must be a number, got {value:?}")))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
