//! File operations on the AIDE database and log.
//!
//! None of these functions take the daemon's file lock themselves; callers
//! hold it for the duration of any sequence that touches these files.

use crate::error::AideError;
use crate::paths::{AidePaths, READ_DB_FILE, READ_LOG_FILE};
use chrono::{DateTime, Local};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Timestamp format of backup suffixes
const BACKUP_TIME_FORMAT: &str = "%Y%m%dT%H_%M_%S";

/// True when `path` does not exist or has zero length.
///
/// Any other metadata error (permissions, I/O) is returned.
pub fn is_missing_or_empty(path: &Path) -> Result<bool, AideError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(AideError::io(path, e)),
    }
}

/// Copy a non-empty regular file over `dst` and flush it to disk.
///
/// The data goes to a sibling temporary file first and is renamed into
/// place, so readers of `dst` see either the old or the new contents.
pub fn copy_non_empty(src: &Path, dst: &Path) -> Result<(), AideError> {
    debug!("copying {} to {}", src.display(), dst.display());
    let meta = fs::metadata(src).map_err(|e| AideError::io(src, e))?;
    if !meta.is_file() {
        return Err(AideError::NotRegularFile(src.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(AideError::EmptyFile(src.to_path_buf()));
    }

    let tmp = temp_sibling(dst);
    let result = (|| {
        let mut source = fs::File::open(src).map_err(|e| AideError::io(src, e))?;
        let mut target = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| AideError::io(&tmp, e))?;
        io::copy(&mut source, &mut target).map_err(|e| AideError::io(&tmp, e))?;
        target.flush().map_err(|e| AideError::io(&tmp, e))?;
        target.sync_all().map_err(|e| AideError::io(&tmp, e))?;
        fs::rename(&tmp, dst).map_err(|e| AideError::io(dst, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{name}.tmp"))
}

/// Path of the backup of `path` taken at `now`
#[must_use]
pub fn backup_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".backup-{}", now.format(BACKUP_TIME_FORMAT)));
    PathBuf::from(name)
}

/// Copy `path` to a timestamped backup.
///
/// A missing or empty file has nothing worth keeping and is skipped.
/// Returns the backup path when one was written.
pub fn back_up(path: &Path, now: DateTime<Local>) -> Result<Option<PathBuf>, AideError> {
    if is_missing_or_empty(path)? {
        debug!("{} is missing or empty, did not back up", path.display());
        return Ok(None);
    }
    let target = backup_path(path, now);
    copy_non_empty(path, &target)?;
    Ok(Some(target))
}

/// Keep only the newest `max` backups of `file_name` inside `dir`.
///
/// Failing to delete an individual backup is logged and skipped; only a
/// failure to list the directory is returned.
pub fn prune_backups(dir: &Path, file_name: &str, max: usize) -> Result<usize, AideError> {
    let prefix = format!("{file_name}.backup-");
    let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| AideError::io(dir, e))? {
        let entry = entry.map_err(|e| AideError::io(dir, e))?;
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() || !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        backups.push((modified, entry.path()));
    }

    if backups.len() <= max {
        return Ok(0);
    }

    // Oldest first; equal mtimes fall back to the timestamped name
    backups.sort();
    let excess = backups.len() - max;
    let mut removed = 0;
    for (_, path) in backups.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("pruned backup {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("error removing backup {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// Delete `path`; a file that is already gone counts as success
pub fn remove_if_exists(path: &Path) -> Result<(), AideError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AideError::io(path, e)),
    }
}

/// Back up the read database and log, pruning old backups of each
pub fn back_up_aide_files(
    paths: &AidePaths,
    max_backups: usize,
    now: DateTime<Local>,
) -> Result<(), AideError> {
    back_up(&paths.read_db(), now)?;
    prune_backups(paths.file_dir(), READ_DB_FILE, max_backups)?;
    back_up(&paths.read_log(), now)?;
    prune_backups(paths.file_dir(), READ_LOG_FILE, max_backups)?;
    Ok(())
}

/// Promote the freshly written database into the read location
pub fn promote_db(paths: &AidePaths) -> Result<(), AideError> {
    copy_non_empty(&paths.write_db(), &paths.read_db())
}

/// Promote the freshly written log, if aide produced one.
///
/// Returns whether a log was promoted.
pub fn promote_log_if_present(paths: &AidePaths) -> Result<bool, AideError> {
    let written = paths.write_log();
    if is_missing_or_empty(&written)? {
        debug!("{} is missing or empty, did not copy", written.display());
        return Ok(false);
    }
    copy_non_empty(&written, &paths.read_log())?;
    Ok(true)
}

/// Remove the re-init marker from both its current and legacy location
pub fn remove_reinit_markers(paths: &AidePaths) -> Result<(), AideError> {
    remove_if_exists(&paths.legacy_reinit_marker())?;
    remove_if_exists(&paths.reinit_marker())
}

/// Whether a re-init marker exists in either location
pub fn reinit_requested(paths: &AidePaths) -> Result<bool, AideError> {
    for marker in [paths.reinit_marker(), paths.legacy_reinit_marker()] {
        match fs::metadata(&marker) {
            Ok(_) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(AideError::io(marker, e)),
        }
    }
    Ok(false)
}
