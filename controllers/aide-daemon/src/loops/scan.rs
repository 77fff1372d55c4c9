//! Periodic `aide` checks.

use super::LoopContext;
use crate::error::DaemonError;
use crate::shutdown::Shutdown;
use aide::exit::SENTINEL_ERROR;
use aide::{files, AideExit, ScanOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

const LOOP: &str = "aideLoop";

pub async fn run(ctx: Arc<LoopContext>, mut shutdown: Shutdown) -> Result<(), DaemonError> {
    info!("starting the AIDE scan loop");
    loop {
        scan_once(&ctx).await?;

        // A skipped tick waits a full interval too
        if shutdown.sleep(ctx.config.interval).await {
            debug!("scan loop stopping");
            return Ok(());
        }
    }
}

/// Run one check unless the node is held off or initializing.
///
/// Returns whether a check ran.
pub async fn scan_once(ctx: &LoopContext) -> Result<bool, DaemonError> {
    let runtime = &ctx.runtime;
    if runtime.holding() {
        debug!("holding off, skipping the scan");
        return Ok(false);
    }
    if runtime.initializing() {
        debug!("the AIDE database is initializing, skipping the scan");
        return Ok(false);
    }

    let guard = runtime.lock_files(LOOP).await;
    // Re-init may have started while we waited for the lock
    if runtime.initializing() {
        return Ok(false);
    }

    let exit = match ctx.aide.check().await {
        Ok(exit) => exit,
        Err(e) => {
            warn!("{}", e);
            AideExit::from_code(SENTINEL_ERROR)
        }
    };
    match exit.outcome() {
        ScanOutcome::Clean => info!("AIDE check found no differences"),
        ScanOutcome::ChangesDetected => info!("AIDE check found differences ({})", exit),
        ScanOutcome::IoError => warn!("AIDE check hit a transient I/O error, retrying next interval"),
        ScanOutcome::Failed => warn!("AIDE check failed with {}: {}", exit, exit.message()),
    }

    if let Err(e) = files::promote_log_if_present(&ctx.config.paths) {
        drop(guard);
        let e = DaemonError::from(e);
        ctx.reporter.log_and_report_error("Error promoting the AIDE log", &e).await;
        return Err(e);
    }

    runtime.publish_result(exit.code());
    drop(guard);
    Ok(true)
}
