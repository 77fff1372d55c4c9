//! Locations of the AIDE database, log, re-init marker and configuration.
//!
//! AIDE writes to the `*.new` files; the daemon promotes them into the
//! read locations consumed by the next check and by the log collector.

use std::path::{Path, PathBuf};

/// Database read by `aide --check`
pub const READ_DB_FILE: &str = "aide.db.gz";
/// Database written by `aide --init`
pub const WRITE_DB_FILE: &str = "aide.db.gz.new";
/// Log read by the log collector
pub const READ_LOG_FILE: &str = "aide.log";
/// Log written by `aide --check`
pub const WRITE_LOG_FILE: &str = "aide.log.new";
/// Marker requesting a re-initialization
pub const REINIT_FILE: &str = "aide.reinit";
/// Rewritten configuration passed to aide
pub const CONFIG_FILE: &str = "aide.conf";

/// Directory roots the daemon works under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AidePaths {
    file_dir: PathBuf,
    run_dir: PathBuf,
    config_dir: PathBuf,
}

impl AidePaths {
    /// `file_dir` holds databases and logs, `run_dir` the re-init marker
    /// and `config_dir` the configuration.
    pub fn new(
        file_dir: impl Into<PathBuf>,
        run_dir: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            file_dir: file_dir.into(),
            run_dir: run_dir.into(),
            config_dir: config_dir.into(),
        }
    }

    #[must_use]
    pub fn file_dir(&self) -> &Path {
        &self.file_dir
    }

    #[must_use]
    pub fn read_db(&self) -> PathBuf {
        self.file_dir.join(READ_DB_FILE)
    }

    #[must_use]
    pub fn write_db(&self) -> PathBuf {
        self.file_dir.join(WRITE_DB_FILE)
    }

    #[must_use]
    pub fn read_log(&self) -> PathBuf {
        self.file_dir.join(READ_LOG_FILE)
    }

    #[must_use]
    pub fn write_log(&self) -> PathBuf {
        self.file_dir.join(WRITE_LOG_FILE)
    }

    #[must_use]
    pub fn reinit_marker(&self) -> PathBuf {
        self.run_dir.join(REINIT_FILE)
    }

    /// Marker location used by older daemons, still honoured and cleaned up
    #[must_use]
    pub fn legacy_reinit_marker(&self) -> PathBuf {
        self.file_dir.join(REINIT_FILE)
    }

    #[must_use]
    pub fn config(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}
