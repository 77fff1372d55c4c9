//! Daemon worker loops.
//!
//! Each loop runs in its own task and returns only on shutdown or on a
//! fatal error, which the supervisor turns into process exit.

pub mod collector;
pub mod holdoff;
pub mod instance_watch;
pub mod reinit;
pub mod scan;

use crate::backoff::ExponentialBackoff;
use crate::config::DaemonConfig;
use crate::report::Reporter;
use crate::runtime::DaemonRuntime;
use aide::AideRunner;
use std::sync::Arc;
use std::time::Duration;

/// How often the re-init and hold-off loops look at their inputs
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the file-side loops share
pub struct LoopContext {
    pub runtime: Arc<DaemonRuntime>,
    pub config: DaemonConfig,
    pub aide: Arc<dyn AideRunner>,
    pub reporter: Reporter,
    /// Poll period of the re-init and hold-off loops
    pub poll_interval: Duration,
    /// Retry policy for the transient aide init failure
    pub init_backoff: ExponentialBackoff,
}

impl LoopContext {
    pub fn new(
        runtime: Arc<DaemonRuntime>,
        config: DaemonConfig,
        aide: Arc<dyn AideRunner>,
        reporter: Reporter,
    ) -> Self {
        Self {
            runtime,
            config,
            aide,
            reporter,
            poll_interval: POLL_INTERVAL,
            init_backoff: ExponentialBackoff::default(),
        }
    }
}
