//! Rewrites an uploaded `aide.conf` for use inside the daemon container.
//!
//! The host filesystem is mounted under [`HOST_PREFIX`], so every rule path
//! gets that prefix, and the database/report locations are pinned to the
//! files the daemon rotates.

use crate::error::AideError;

/// Where the host root filesystem is mounted in the daemon container
pub const HOST_PREFIX: &str = "/hostroot";

/// Directory holding the AIDE database and log, seen from the container
pub const AIDE_DIR: &str = "/hostroot/etc/kubernetes";

/// Rewrite `raw` line by line.
///
/// Fails with [`AideError::EmptyInput`] when there is nothing to rewrite.
pub fn prepare_config(raw: &str) -> Result<String, AideError> {
    if raw.lines().next().is_none() {
        return Err(AideError::EmptyInput);
    }

    let out: Vec<String> = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(rewrite_line)
        .collect();

    Ok(out.join("\n"))
}

fn rewrite_line(line: &str) -> String {
    if line.starts_with("@@define DBDIR") {
        format!("@@define DBDIR {AIDE_DIR}")
    } else if line.starts_with("@@define LOGDIR") {
        format!("@@define LOGDIR {AIDE_DIR}")
    } else if line.starts_with("database=") {
        "database=file:@@{DBDIR}/aide.db.gz".to_string()
    } else if line.starts_with("database_out=") {
        "database_out=file:@@{DBDIR}/aide.db.gz.new".to_string()
    } else if line.starts_with("report_url=file") {
        "report_url=file:@@{LOGDIR}/aide.log.new".to_string()
    } else if let Some(rule) = line.strip_prefix('!') {
        if rule.starts_with('/') {
            format!("!{}", with_host_prefix(rule))
        } else {
            line.to_string()
        }
    } else if line.starts_with('/') {
        with_host_prefix(line)
    } else {
        line.to_string()
    }
}

fn with_host_prefix(path: &str) -> String {
    if path.starts_with(HOST_PREFIX) {
        path.to_string()
    } else {
        format!("{HOST_PREFIX}{path}")
    }
}
