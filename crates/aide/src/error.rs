//! AIDE wrapper errors

use crate::exit::AideExit;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing, running or promoting AIDE files
#[derive(Debug, Error)]
pub enum AideError {
    /// File system operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source of a copy is not a regular file
    #[error("{} is not a regular file", .0.display())]
    NotRegularFile(PathBuf),

    /// Source of a copy is empty
    #[error("{} is empty", .0.display())]
    EmptyFile(PathBuf),

    /// Configuration text had no lines
    #[error("input empty")]
    EmptyInput,

    /// The aide binary could not be started
    #[error("failed to run aide: {0}")]
    Spawn(#[source] std::io::Error),

    /// aide ran and exited with a non-zero status
    #[error("aide exited with {0}")]
    Exit(AideExit),
}

impl AideError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit status carried by this error, if it came from aide itself
    #[must_use]
    pub fn exit(&self) -> Option<AideExit> {
        match self {
            Self::Exit(exit) => Some(*exit),
            _ => None,
        }
    }
}
