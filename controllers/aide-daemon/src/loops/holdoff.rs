//! Hold-off evaluation.
//!
//! Mirrors the owner's hold-off annotation into the runtime's `holding`
//! flag, which the scan loop checks before every run.

use super::LoopContext;
use crate::error::DaemonError;
use crate::snapshot::InstanceSnapshot;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use tracing::{debug, info};

const LOOP: &str = "holdOffLoop";

pub async fn run(ctx: Arc<LoopContext>, mut shutdown: Shutdown) -> Result<(), DaemonError> {
    info!("starting the hold-off loop");
    loop {
        let instance = tokio::select! {
            instance = ctx.runtime.instance() => instance,
            () = shutdown.triggered() => return Ok(()),
        };

        ctx.runtime
            .set_holding(LOOP, should_hold(&instance, &ctx.config.node_name));

        if shutdown.sleep(ctx.poll_interval).await {
            debug!("hold-off loop stopping");
            return Ok(());
        }
    }
}

/// Whether scans on `node` must be held off
#[must_use]
pub fn should_hold(instance: &InstanceSnapshot, node: &str) -> bool {
    instance.hold_off.as_ref().is_some_and(|scope| scope.contains(node))
}
