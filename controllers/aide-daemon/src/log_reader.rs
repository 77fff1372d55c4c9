//! Incremental reads of the AIDE log that survive rotation.
//!
//! The log is replaced (new inode) every time a scan result is promoted,
//! and may be truncated in place by an administrator. Both cases restart
//! the read from the beginning.

use crate::runtime::LogCursor;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::debug;

/// Read everything appended to `path` since `cursor`, advancing it.
///
/// A missing log reads as empty and leaves the cursor untouched.
pub fn read_new_contents(path: &Path, cursor: &mut LogCursor) -> io::Result<Vec<u8>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist yet", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let meta = file.metadata()?;

    let inode = meta.ino();
    if cursor.inode != Some(inode) {
        if cursor.inode.is_some() {
            debug!("{} was rotated, reading from the start", path.display());
        }
        cursor.inode = Some(inode);
        cursor.offset = 0;
    }
    if cursor.offset > meta.len() {
        debug!("{} shrank below offset {}, reading from the start", path.display(), cursor.offset);
        cursor.offset = 0;
    }

    if file.seek(SeekFrom::Start(cursor.offset)).is_err() {
        cursor.offset = 0;
        file.seek(SeekFrom::Start(0))?;
    }

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    cursor.offset += contents.len() as u64;
    Ok(contents)
}
