//! FileIntegrityNodeStatus CRD
//!
//! One object per (FileIntegrity, node) pair holding the latest scan
//! outcome and a short history. Written by the report aggregator, read by
//! the status reconciler.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of results kept in `results`
pub const MAX_RESULT_HISTORY: usize = 5;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "fileintegrity.microscaler.io",
    version = "v1alpha1",
    kind = "FileIntegrityNodeStatus",
    namespaced,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".spec.nodeName"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".spec.lastResult.condition"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegrityNodeStatusSpec {
    /// Node the results were produced on
    pub node_name: String,

    /// Most recent result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ScanResult>,

    /// Bounded history, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ScanResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// When the report was observed
    pub last_probe_time: DateTime<Utc>,

    /// Scan outcome
    pub condition: NodeCondition,

    /// ConfigMap holding the full log of a failed scan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_config_map_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_config_map_namespace: Option<String>,

    /// Error reported by the node daemon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default)]
    pub files_added: u32,

    #[serde(default)]
    pub files_changed: u32,

    #[serde(default)]
    pub files_removed: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum NodeCondition {
    /// The scan found no differences
    Succeeded,
    /// The scan found differences
    Failed,
    /// The daemon could not produce a result
    Errored,
}

impl NodeCondition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Errored => "Errored",
        }
    }
}

impl FileIntegrityNodeStatusSpec {
    /// Record a new result, keeping at most [`MAX_RESULT_HISTORY`] entries.
    ///
    /// Consecutive results with the same condition collapse into one entry
    /// so the history shows transitions rather than every probe.
    pub fn record(&mut self, result: ScanResult) {
        if let Some(last) = self.results.last_mut() {
            if last.condition == result.condition {
                *last = result.clone();
                self.last_result = Some(result);
                return;
            }
        }
        self.results.push(result.clone());
        if self.results.len() > MAX_RESULT_HISTORY {
            let excess = self.results.len() - MAX_RESULT_HISTORY;
            self.results.drain(..excess);
        }
        self.last_result = Some(result);
    }

    /// Condition of the most recent result
    #[must_use]
    pub fn condition(&self) -> Option<NodeCondition> {
        self.last_result.as_ref().map(|r| r.condition)
    }
}
