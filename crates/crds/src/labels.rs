//! Label and annotation keys, plus object naming helpers.
//!
//! Report ConfigMaps written by the node daemon and read by the status
//! controller are identified purely by these keys, so both binaries must
//! agree on them.

/// API group shared by every key below
pub const GROUP: &str = "fileintegrity.microscaler.io";

/// Label carrying the name of the owning `FileIntegrity`
pub const OWNER_LABEL: &str = "fileintegrity.microscaler.io/owner";

/// Label marking a ConfigMap as a scan report (value is always empty)
pub const RESULT_LOG_LABEL: &str = "fileintegrity.microscaler.io/result-log";

/// Label carrying the node a report was produced on
pub const NODE_LABEL: &str = "fileintegrity.microscaler.io/node";

/// Label put on the re-init DaemonSet so the status controller can find it
pub const REINIT_LABEL: &str = "fileintegrity.microscaler.io/re-init";

/// Annotation present when the report payload is gzip + base64 encoded
pub const COMPRESSED_ANNOTATION: &str = "fileintegrity.microscaler.io/compressed";

/// Annotation holding a node-side error message
pub const ERROR_MSG_ANNOTATION: &str = "fileintegrity.microscaler.io/error-msg";

/// Annotation holding the number of added files
pub const FILES_ADDED_ANNOTATION: &str = "fileintegrity.microscaler.io/files-added";

/// Annotation holding the number of changed files
pub const FILES_CHANGED_ANNOTATION: &str = "fileintegrity.microscaler.io/files-changed";

/// Annotation holding the number of removed files
pub const FILES_REMOVED_ANNOTATION: &str = "fileintegrity.microscaler.io/files-removed";

/// Data key of the report payload
pub const LOG_CONTENT_KEY: &str = "integritylog";

/// Prefix of the per-resource scan DaemonSet
pub const DAEMON_SET_PREFIX: &str = "aide";

/// Prefix of the per-resource re-init DaemonSet
pub const REINIT_DAEMON_SET_PREFIX: &str = "aide-reinit";

/// Maximum length of a DNS-1123 label
const DNS_LABEL_MAX: usize = 63;

/// Name of the scan DaemonSet for a `FileIntegrity`
#[must_use]
pub fn daemon_set_name(resource: &str) -> String {
    dns_length_name(&format!("{DAEMON_SET_PREFIX}-{resource}"))
}

/// Name of the re-init DaemonSet for a `FileIntegrity`
#[must_use]
pub fn reinit_daemon_set_name(resource: &str) -> String {
    dns_length_name(&format!("{REINIT_DAEMON_SET_PREFIX}-{resource}"))
}

/// Name of the `FileIntegrityNodeStatus` for a resource/node pair
#[must_use]
pub fn node_status_name(resource: &str, node: &str) -> String {
    format!("{resource}-{node}")
}

/// Default prefix of the report ConfigMaps for a resource
#[must_use]
pub fn report_prefix(resource: &str) -> String {
    format!("aide-{resource}")
}

/// Name of a report ConfigMap (`<prefix>-<node>`)
#[must_use]
pub fn report_name(prefix: &str, node: &str) -> String {
    format!("{prefix}-{node}")
}

/// Name of the durable copy of a failed scan log
#[must_use]
pub fn failed_log_name(resource: &str, node: &str) -> String {
    format!("aide-{resource}-{node}-failed")
}

/// Truncates a generated name to a valid DNS label, never ending in '-'
fn dns_length_name(name: &str) -> String {
    if name.len() <= DNS_LABEL_MAX {
        return name.to_string();
    }
    let mut end = DNS_LABEL_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_set_names() {
        assert_eq!(daemon_set_name("worker-fileintegrity"), "aide-worker-fileintegrity");
        assert_eq!(reinit_daemon_set_name("example"), "aide-reinit-example");
    }

    #[test]
    fn test_long_names_are_truncated_to_dns_length() {
        let long = "x".repeat(80);
        let name = daemon_set_name(&long);
        assert_eq!(name.len(), 63, "name should be capped at 63 characters");
        assert!(name.starts_with("aide-"));

        // A cut landing right after a separator must not leave a trailing dash
        let dashed = format!("{}-{}", "a".repeat(57), "b".repeat(20));
        let name = daemon_set_name(&dashed);
        assert!(!name.ends_with('-'), "got {name}");
    }

    #[test]
    fn test_report_names() {
        assert_eq!(report_name(&report_prefix("example"), "node-1"), "aide-example-node-1");
        assert_eq!(failed_log_name("example", "node-1"), "aide-example-node-1-failed");
        assert_eq!(node_status_name("example", "node-1"), "example-node-1");
    }
}
