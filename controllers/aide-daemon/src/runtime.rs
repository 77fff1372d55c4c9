//! Shared daemon state.
//!
//! One `DaemonRuntime` is created at startup and handed to every loop by
//! `Arc`. Each concern has its own lock so the one-second hold-off poll
//! never waits behind a scan that holds the file lock for minutes.

use crate::snapshot::InstanceSnapshot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Mailbox value meaning no scan result is waiting
pub const NO_RESULT: i32 = -1;

/// Read position in the AIDE log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCursor {
    /// Inode of the log when it was last read
    pub inode: Option<u64>,
    /// Bytes of that inode already consumed
    pub offset: u64,
}

#[derive(Debug)]
pub struct DaemonRuntime {
    initializing: Mutex<bool>,
    holding: Mutex<bool>,
    files: tokio::sync::Mutex<()>,
    instance: watch::Sender<Option<Arc<InstanceSnapshot>>>,
    latest_result: Mutex<i32>,
    result_ready: Notify,
    log_cursor: Mutex<LogCursor>,
}

/// Exclusive access to the AIDE database and log files.
///
/// Released when dropped, on every exit path.
#[derive(Debug)]
pub struct FilesGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
    holder: &'static str,
}

impl Drop for FilesGuard<'_> {
    fn drop(&mut self) {
        debug!("{} released the AIDE files lock", self.holder);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DaemonRuntime {
    /// New runtime state.
    ///
    /// Starts out both initializing and holding, so nothing scans until the
    /// re-init loop has checked the database and the hold-off loop has
    /// seen the owning resource.
    #[must_use]
    pub fn new() -> Self {
        let (instance, _) = watch::channel(None);
        Self {
            initializing: Mutex::new(true),
            holding: Mutex::new(true),
            files: tokio::sync::Mutex::new(()),
            instance,
            latest_result: Mutex::new(NO_RESULT),
            result_ready: Notify::new(),
            log_cursor: Mutex::new(LogCursor::default()),
        }
    }

    #[must_use]
    pub fn initializing(&self) -> bool {
        *lock(&self.initializing)
    }

    pub fn set_initializing(&self, who: &str, value: bool) {
        let mut current = lock(&self.initializing);
        if *current != value {
            info!("{}: initializing set to {}", who, value);
            *current = value;
        }
    }

    #[must_use]
    pub fn holding(&self) -> bool {
        *lock(&self.holding)
    }

    pub fn set_holding(&self, who: &str, value: bool) {
        let mut current = lock(&self.holding);
        if *current != value {
            info!("{}: holding set to {}", who, value);
            *current = value;
        }
    }

    /// Wait for exclusive access to the AIDE files
    pub async fn lock_files(&self, holder: &'static str) -> FilesGuard<'_> {
        debug!("{} waiting for the AIDE files lock", holder);
        let guard = self.files.lock().await;
        debug!("{} acquired the AIDE files lock", holder);
        FilesGuard {
            _guard: guard,
            holder,
        }
    }

    /// Latest snapshot of the owning resource, waiting for the first one
    pub async fn instance(&self) -> Arc<InstanceSnapshot> {
        let mut rx = self.instance.subscribe();
        loop {
            if let Some(snapshot) = rx.borrow_and_update().as_ref() {
                return Arc::clone(snapshot);
            }
            // The sender lives as long as self, so this only ever waits
            let _ = rx.changed().await;
        }
    }

    /// Latest snapshot without waiting
    #[must_use]
    pub fn try_instance(&self) -> Option<Arc<InstanceSnapshot>> {
        self.instance.borrow().clone()
    }

    pub fn set_instance(&self, snapshot: InstanceSnapshot) {
        debug!(
            "FileIntegrity {}/{} updated (resourceVersion {:?})",
            snapshot.namespace, snapshot.name, snapshot.resource_version
        );
        self.instance.send_replace(Some(Arc::new(snapshot)));
    }

    /// Overwrite the latest scan result and wake the collector
    pub fn publish_result(&self, code: i32) {
        *lock(&self.latest_result) = code;
        self.result_ready.notify_one();
    }

    /// Take the latest scan result, leaving [`NO_RESULT`] behind
    pub fn take_latest_result(&self) -> i32 {
        std::mem::replace(&mut *lock(&self.latest_result), NO_RESULT)
    }

    /// Latest scan result without consuming it
    #[must_use]
    pub fn peek_latest_result(&self) -> i32 {
        *lock(&self.latest_result)
    }

    /// Resolves after the next `publish_result` (or immediately if one
    /// happened since the last wait)
    pub async fn result_published(&self) {
        self.result_ready.notified().await;
    }

    /// Exclusive access to the log read position
    pub fn log_cursor(&self) -> MutexGuard<'_, LogCursor> {
        lock(&self.log_cursor)
    }
}

impl Default for DaemonRuntime {
    fn default() -> Self {
        Self::new()
    }
}
