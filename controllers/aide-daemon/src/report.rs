//! Scan reports sent to the cluster.
//!
//! Each report is a short-lived ConfigMap named `<prefix>-<node>`. The
//! status controller turns it into a FileIntegrityNodeStatus and deletes
//! it, which frees the name for the next upload.

use crate::backoff::{retry, ExponentialBackoff, Retry, MAX_RETRIES};
use crate::error::DaemonError;
use crate::runtime::DaemonRuntime;
use crate::snapshot::InstanceSnapshot;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crds::{
    COMPRESSED_ANNOTATION, ERROR_MSG_ANNOTATION, FILES_ADDED_ANNOTATION, FILES_CHANGED_ANNOTATION,
    FILES_REMOVED_ANNOTATION, LOG_CONTENT_KEY, NODE_LABEL, OWNER_LABEL, RESULT_LOG_LABEL,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ObjectMeta, PostParams};
use kube_runtime::events::{Event, EventType, Recorder};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, warn};

/// Largest payload a ConfigMap can carry (etcd object limit)
pub const CONFIG_MAP_MAX_SIZE: usize = 1_048_570;

/// Reason of the Warning event recorded for a daemon failure
pub const DAEMON_ERROR_REASON: &str = "DaemonError";

static ADDED_RE: LazyLock<Regex> = LazyLock::new(|| count_regex("Added"));
static CHANGED_RE: LazyLock<Regex> = LazyLock::new(|| count_regex("Changed"));
static REMOVED_RE: LazyLock<Regex> = LazyLock::new(|| count_regex("Removed"));

#[allow(clippy::expect_used, reason = "pattern is a compile-time constant")]
fn count_regex(kind: &str) -> Regex {
    Regex::new(&format!(r"\s+{kind} entries:\s+(\d+)")).expect("valid count pattern")
}

/// File counts from an AIDE summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    pub added: u64,
    pub changed: u64,
    pub removed: u64,
}

impl ChangeCounts {
    /// Parse the summary section of an AIDE log; absent counts are zero
    #[must_use]
    pub fn parse(log: &str) -> Self {
        let count = |re: &Regex| {
            re.captures(log)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };
        Self {
            added: count(&ADDED_RE),
            changed: count(&CHANGED_RE),
            removed: count(&REMOVED_RE),
        }
    }
}

/// Whether a log of `size` bytes must be compressed to fit in a report
#[must_use]
pub fn needs_compression(size: usize) -> bool {
    size > CONFIG_MAP_MAX_SIZE
}

/// Gzip `data`
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn report_meta(owner: &InstanceSnapshot, name: &str, node: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(owner.namespace.clone()),
        owner_references: Some(vec![owner.owner_reference()]),
        labels: Some(BTreeMap::from([
            (OWNER_LABEL.to_string(), owner.name.clone()),
            (RESULT_LOG_LABEL.to_string(), String::new()),
            (NODE_LABEL.to_string(), node.to_string()),
        ])),
        ..ObjectMeta::default()
    }
}

/// Report without payload: an OK result, or an error when `annotations`
/// carries one
#[must_use]
pub fn informational_report(
    owner: &InstanceSnapshot,
    name: &str,
    node: &str,
    annotations: BTreeMap<String, String>,
) -> ConfigMap {
    let mut metadata = report_meta(owner, name, node);
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }
    ConfigMap {
        metadata,
        ..ConfigMap::default()
    }
}

/// Report carrying a failed scan's log.
///
/// With `compressed` set the payload is its base64 encoding. A payload that
/// still does not fit is replaced by a message pointing at the log on the
/// node.
#[must_use]
pub fn log_report(
    owner: &InstanceSnapshot,
    name: &str,
    node: &str,
    contents: &[u8],
    compressed: Option<&[u8]>,
) -> ConfigMap {
    let text = String::from_utf8_lossy(contents);
    debug!("uncompressed log size: {}", contents.len());
    let counts = ChangeCounts::parse(&text);
    debug!(
        "added {} changed {} removed {}",
        counts.added, counts.changed, counts.removed
    );

    let mut annotations = BTreeMap::from([
        (FILES_ADDED_ANNOTATION.to_string(), counts.added.to_string()),
        (FILES_CHANGED_ANNOTATION.to_string(), counts.changed.to_string()),
        (FILES_REMOVED_ANNOTATION.to_string(), counts.removed.to_string()),
    ]);

    let mut payload = text.into_owned();
    if let Some(compressed) = compressed {
        if compressed.len() > CONFIG_MAP_MAX_SIZE {
            debug!("compressed AIDE log is too large ({})", compressed.len());
            payload = format!(
                "compressed AIDE log is too large for a configMap ({}) - fetch it from /etc/kubernetes/aide.log on node {}",
                compressed.len(),
                node
            );
        } else {
            payload = BASE64.encode(compressed);
            debug!("compressed, encoded log size: {}", payload.len());
        }
        annotations.insert(COMPRESSED_ANNOTATION.to_string(), String::new());
    }

    if payload.len() > CONFIG_MAP_MAX_SIZE {
        debug!("compressed, encoded AIDE log is too large ({})", payload.len());
        payload = format!(
            "compressed, encoded AIDE log is too large for a configMap ({}) - fetch it from /etc/kubernetes/aide.log on node {}",
            payload.len(),
            node
        );
    }

    let mut metadata = report_meta(owner, name, node);
    metadata.annotations = Some(annotations);
    ConfigMap {
        metadata,
        data: Some(BTreeMap::from([(LOG_CONTENT_KEY.to_string(), payload)])),
        ..ConfigMap::default()
    }
}

/// Destination of report ConfigMaps and daemon events
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    async fn create(&self, report: &ConfigMap) -> Result<(), DaemonError>;

    /// Record a Warning event on the owning FileIntegrity
    async fn warn(&self, owner: &InstanceSnapshot, reason: &str, note: &str) -> Result<(), DaemonError>;
}

/// Creates reports and events through the Kubernetes API
pub struct KubeReportSink {
    api: Api<ConfigMap>,
    recorder: Recorder,
}

impl KubeReportSink {
    pub fn new(api: Api<ConfigMap>, recorder: Recorder) -> Self {
        Self { api, recorder }
    }
}

#[async_trait::async_trait]
impl ReportSink for KubeReportSink {
    async fn create(&self, report: &ConfigMap) -> Result<(), DaemonError> {
        self.api.create(&PostParams::default(), report).await?;
        Ok(())
    }

    async fn warn(&self, owner: &InstanceSnapshot, reason: &str, note: &str) -> Result<(), DaemonError> {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(note.to_string()),
            action: "Scan".to_string(),
            secondary: None,
        };
        self.recorder.publish(&event, &owner.object_reference()).await?;
        Ok(())
    }
}

/// Builds and uploads reports for this node, retrying with backoff
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
    runtime: Arc<DaemonRuntime>,
    prefix: String,
    node: String,
    backoff: ExponentialBackoff,
}

impl Reporter {
    pub fn new(
        sink: Arc<dyn ReportSink>,
        runtime: Arc<DaemonRuntime>,
        prefix: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            runtime,
            prefix: prefix.into(),
            node: node.into(),
            backoff: ExponentialBackoff::default(),
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    async fn send<F>(&self, what: &str, owner: &InstanceSnapshot, build: F) -> Result<(), DaemonError>
    where
        F: Fn(&InstanceSnapshot, &str, &str) -> ConfigMap + Sync,
    {
        let node = self.node.as_str();
        let name = crds::report_name(&self.prefix, node);
        debug!("creating temporary configMap '{}' to report {}", name, what);

        let sink = &self.sink;
        let build = &build;
        let name = name.as_str();
        retry(what, self.backoff.clone(), MAX_RETRIES, move || async move {
            let report = build(owner, name, node);
            sink.create(&report).await.map_err(Retry::Transient)
        })
        .await
    }

    /// Latest owner snapshot, without waiting for the first one
    fn current_owner(&self) -> Result<Arc<InstanceSnapshot>, DaemonError> {
        self.runtime.try_instance().ok_or_else(|| {
            DaemonError::InvalidInstance("FileIntegrity has not been fetched yet".to_string())
        })
    }

    /// Report a scan that found no differences
    pub async fn report_ok(&self) -> Result<(), DaemonError> {
        let owner = self.runtime.instance().await;
        self.send("a successful scan result", &owner, |owner, name, node| {
            informational_report(owner, name, node, BTreeMap::new())
        })
        .await
    }

    /// Report a daemon-side error.
    ///
    /// Fails at once when the owner has not been fetched yet.
    pub async fn report_error(&self, message: &str) -> Result<(), DaemonError> {
        let owner = self.current_owner()?;
        self.send_error(&owner, message).await
    }

    async fn send_error(&self, owner: &InstanceSnapshot, message: &str) -> Result<(), DaemonError> {
        self.send("an ERROR scan result", owner, |owner, name, node| {
            let annotations =
                BTreeMap::from([(ERROR_MSG_ANNOTATION.to_string(), message.to_string())]);
            informational_report(owner, name, node, annotations)
        })
        .await
    }

    /// Upload the log of a failed scan
    pub async fn upload_log(
        &self,
        contents: &[u8],
        compressed: Option<&[u8]>,
    ) -> Result<(), DaemonError> {
        let owner = self.runtime.instance().await;
        self.send("a FAILED scan result", &owner, |owner, name, node| {
            log_report(owner, name, node, contents, compressed)
        })
        .await
    }

    /// Log `err`, then try to surface it as an error report and a Warning
    /// event on the owner.
    ///
    /// Never waits for the owner to be fetched. A failure to report is
    /// only logged; the caller decides what `err` means for the daemon.
    pub async fn log_and_report_error(&self, context: &str, err: &(dyn Display + Sync)) {
        error!("{}: {}", context, err);
        let owner = match self.current_owner() {
            Ok(owner) => owner,
            Err(e) => {
                warn!("couldn't report the daemon failure ({})", e);
                return;
            }
        };

        let message = format!("{context}: {err}");
        if let Err(e) = self.send_error(&owner, &message).await {
            warn!("couldn't report the daemon failure ({})", e);
            return;
        }
        if let Err(e) = self.sink.warn(&owner, DAEMON_ERROR_REASON, &message).await {
            warn!("couldn't record an event for the daemon failure ({})", e);
        }
    }
}
