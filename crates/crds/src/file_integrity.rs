//! FileIntegrity CRD
//!
//! Declares which nodes run AIDE and where their configuration comes from.
//! The status controller owns `status.phase`; hold-off and re-init requests
//! travel as annotations (see [`crate::annotations`]).

use crate::annotations::{NodeScope, HOLDOFF_ANNOTATION, REINIT_ANNOTATION};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default grace period between scans, in seconds
pub const DEFAULT_GRACE_PERIOD: i64 = 900;

/// Default number of database/log backups kept on each node
pub const DEFAULT_MAX_BACKUPS: i32 = 5;

/// Default data key holding the AIDE configuration
pub const DEFAULT_CONFIG_KEY: &str = "aide.conf";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "fileintegrity.microscaler.io",
    version = "v1alpha1",
    kind = "FileIntegrity",
    namespaced,
    status = "FileIntegrityStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegritySpec {
    /// Nodes the scan DaemonSet is scheduled on
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// AIDE configuration source and scan tuning
    #[serde(default)]
    pub config: FileIntegrityConfig,

    /// Verbose logging in the node daemon
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegrityConfig {
    /// ConfigMap holding a user-provided AIDE configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace of that ConfigMap (defaults to the resource's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Data key inside the ConfigMap
    #[serde(default = "default_config_key")]
    pub key: String,

    /// Seconds between scans
    #[serde(default = "default_grace_period")]
    pub grace_period: i64,

    /// Backups of the database and log kept after a re-init
    #[serde(default = "default_max_backups")]
    pub max_backups: i32,
}

fn default_config_key() -> String {
    DEFAULT_CONFIG_KEY.to_string()
}

fn default_grace_period() -> i64 {
    DEFAULT_GRACE_PERIOD
}

fn default_max_backups() -> i32 {
    DEFAULT_MAX_BACKUPS
}

impl Default for FileIntegrityConfig {
    fn default() -> Self {
        Self {
            name: None,
            namespace: None,
            key: default_config_key(),
            grace_period: DEFAULT_GRACE_PERIOD,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegrityStatus {
    /// Aggregated phase across every node
    #[serde(default)]
    pub phase: FileIntegrityPhase,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
/// Aggregated phase of a `FileIntegrity`
///
/// Values other than the four known phases deserialize to `Unknown` so a
/// newer writer can never be mistaken for one of them.
#[serde(rename_all = "PascalCase")]
pub enum FileIntegrityPhase {
    /// No scan DaemonSet exists yet
    #[default]
    Pending,

    /// Databases are being (re)built or the DaemonSet is rolling out
    Initializing,

    /// Every node reports a usable result
    Active,

    /// At least one node reports an error
    Error,

    /// Unrecognized value
    #[serde(other)]
    Unknown,
}

impl FileIntegrityPhase {
    /// Phase name as stored in the status and used as metric label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Initializing => "Initializing",
            Self::Active => "Active",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for FileIntegrityPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FileIntegrity {
    /// Parsed hold-off annotation, `None` when absent
    #[must_use]
    pub fn hold_off(&self) -> Option<NodeScope> {
        self.annotation(HOLDOFF_ANNOTATION).map(NodeScope::parse)
    }

    /// Parsed re-init annotation, `None` when absent
    #[must_use]
    pub fn reinit(&self) -> Option<NodeScope> {
        self.annotation(REINIT_ANNOTATION).map(NodeScope::parse)
    }

    /// Current phase, `Pending` when no status has been written
    #[must_use]
    pub fn phase(&self) -> FileIntegrityPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Raw annotation value
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}
