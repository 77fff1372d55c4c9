//! AIDE wrapper
//!
//! Everything the node daemon needs to drive the AIDE binary: the on-disk
//! layout of its database and log, promotion and backup of those files,
//! rewriting of user supplied configuration, and classification of exit
//! statuses.

pub mod config;
pub mod error;
pub mod exit;
pub mod files;
pub mod paths;
pub mod runner;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use config::prepare_config;
pub use error::AideError;
pub use exit::{AideExit, ScanOutcome};
pub use paths::AidePaths;
pub use runner::{AideCommand, AideRunner};

#[cfg(any(test, feature = "test-util"))]
pub use mock::{Invocation, InvocationKind, MockAide};
