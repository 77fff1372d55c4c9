//! AIDE exit status classification.
//!
//! AIDE reports detected changes as a bitmask in the low exit codes and
//! uses 14..=19 for its own errors. Codes 20..=22 are not produced by AIDE;
//! the daemon maps ambiguous terminations onto them.

use std::fmt;
use std::io;
use std::path::Path;

/// Lowest AIDE error code
const ERROR_BASE: i32 = 14;

/// Invalid configuration line
pub const CONFIG_ERROR: i32 = 17;
/// Transient I/O error, typically another aide holding the database
pub const IO_ERROR: i32 = 18;
/// Generic failure; under FIPS it means a disallowed digest was requested
pub const RETFAIL: i32 = 255;
/// Disallowed algorithm under FIPS mode
pub const FIPS_ERROR: i32 = 20;
/// RETFAIL seen but FIPS mode could not be determined
pub const POSSIBLE_FIPS_ERROR: i32 = 21;
/// Killed by a signal or otherwise unexplained
pub const SENTINEL_ERROR: i32 = 22;

/// Kernel switch reporting FIPS mode
pub const FIPS_ENABLED_PATH: &str = "/proc/sys/crypto/fips_enabled";

const ERROR_MESSAGES: [&str; 9] = [
    "Error writing error",
    "Invalid argument error",
    "Unimplemented function error",
    "Invalid configureline error",
    "IO error",
    "Version mismatch error",
    "Use of FIPS disallowed algorithm under FIPS mode",
    "Possible use of FIPS disallowed algorithm",
    "Unexpected error",
];

/// What a scan result means for the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No differences found
    Clean,
    /// Files were added, removed or changed
    ChangesDetected,
    /// Transient I/O error, worth retrying
    IoError,
    /// Anything else
    Failed,
}

/// Exit status of one aide invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AideExit(i32);

impl AideExit {
    pub const SUCCESS: Self = Self(0);

    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self(code)
    }

    /// Map a process exit code onto an `AideExit`.
    ///
    /// `None` (terminated by a signal) becomes the sentinel error. RETFAIL
    /// is resolved through `fips_enabled`, which is only consulted then.
    pub fn from_status<F>(code: Option<i32>, fips_enabled: F) -> Self
    where
        F: FnOnce() -> io::Result<bool>,
    {
        match code {
            None => Self(SENTINEL_ERROR),
            Some(RETFAIL) => match fips_enabled() {
                Ok(true) => Self(FIPS_ERROR),
                Ok(false) => Self(RETFAIL),
                Err(_) => Self(POSSIBLE_FIPS_ERROR),
            },
            Some(code) => Self(code),
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        self.0
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn outcome(self) -> ScanOutcome {
        match self.0 {
            0 => ScanOutcome::Clean,
            1..=7 => ScanOutcome::ChangesDetected,
            IO_ERROR => ScanOutcome::IoError,
            _ => ScanOutcome::Failed,
        }
    }

    /// Human readable description of an error status
    #[must_use]
    pub fn message(self) -> &'static str {
        let code = if (ERROR_BASE..=SENTINEL_ERROR).contains(&self.0) {
            self.0
        } else {
            SENTINEL_ERROR
        };
        usize::try_from(code - ERROR_BASE)
            .ok()
            .and_then(|i| ERROR_MESSAGES.get(i))
            .copied()
            .unwrap_or("Unexpected error")
    }
}

impl fmt::Display for AideExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Read the FIPS switch at `path`
pub fn fips_mode_enabled(path: &Path) -> io::Result<bool> {
    let contents = std::fs::read(path)?;
    match contents.first() {
        Some(b'1') => Ok(true),
        Some(b'0') => Ok(false),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected contents in {}", path.display()),
        )),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} has no contents", path.display()),
        )),
    }
}
