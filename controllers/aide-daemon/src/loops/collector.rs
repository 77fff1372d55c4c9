//! Turns scan results into reports.
//!
//! Woken by every published result, and also once per scan interval in
//! case a wake-up was missed.

use super::LoopContext;
use crate::error::DaemonError;
use crate::log_reader::read_new_contents;
use crate::report::{compress, needs_compression};
use crate::runtime::NO_RESULT;
use crate::shutdown::Shutdown;
use aide::exit::{CONFIG_ERROR, IO_ERROR};
use aide::AideExit;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LOOP: &str = "logCollectorLoop";

pub async fn run(ctx: Arc<LoopContext>, mut shutdown: Shutdown) -> Result<(), DaemonError> {
    info!("starting the log collector loop");
    loop {
        tokio::select! {
            () = shutdown.triggered() => {
                debug!("log collector loop stopping");
                return Ok(());
            }
            () = ctx.runtime.result_published() => {}
            () = tokio::time::sleep(ctx.config.interval) => {}
        }
        collect_once(&ctx).await?;
    }
}

/// Handle the latest scan result, if any.
///
/// Only a failure to read or upload a scan log is fatal.
pub async fn collect_once(ctx: &LoopContext) -> Result<(), DaemonError> {
    let code = ctx.runtime.take_latest_result();
    match code {
        NO_RESULT | IO_ERROR => {
            debug!("no scan result to collect");
            Ok(())
        }
        CONFIG_ERROR => {
            let exit = AideExit::from_code(code);
            let message = format!("AIDE error: {} {}", code, exit.message());
            warn!("{}", message);
            if let Err(e) = ctx.reporter.report_error(&message).await {
                error!("failed to report the AIDE configuration error: {}", e);
            }
            Ok(())
        }
        0 => {
            if let Err(e) = ctx.reporter.report_ok().await {
                error!("failed to report a successful scan: {}", e);
            }
            Ok(())
        }
        _ => match upload_scan_log(ctx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                ctx.reporter
                    .log_and_report_error("Error uploading the AIDE log", &e)
                    .await;
                Err(e)
            }
        },
    }
}

async fn upload_scan_log(ctx: &LoopContext) -> Result<(), DaemonError> {
    let contents = {
        let _files = ctx.runtime.lock_files(LOOP).await;
        let mut cursor = ctx.runtime.log_cursor();
        read_new_contents(&ctx.config.paths.read_log(), &mut cursor)
            .map_err(|e| DaemonError::Log(format!("reading the AIDE log: {e}")))?
    };
    if contents.is_empty() {
        debug!("no new AIDE log content to upload");
        return Ok(());
    }

    let compressed = if ctx.config.compress || needs_compression(contents.len()) {
        let gz = compress(&contents)
            .map_err(|e| DaemonError::Log(format!("compressing the AIDE log: {e}")))?;
        debug!("compressed AIDE log from {} to {} bytes", contents.len(), gz.len());
        Some(gz)
    } else {
        None
    };

    ctx.reporter.upload_log(&contents, compressed.as_deref()).await?;
    info!("uploaded {} bytes of AIDE log", contents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::tests::Harness;
    use crate::report::tests::{annotation, MemorySink, FAILED_LOG};
    use crds::{COMPRESSED_ANNOTATION, ERROR_MSG_ANNOTATION, LOG_CONTENT_KEY};
    use std::fs;

    #[tokio::test]
    async fn test_nothing_to_collect() {
        let h = Harness::new(None);
        collect_once(&h.ctx).await.unwrap();
        h.ctx.runtime.publish_result(IO_ERROR);
        collect_once(&h.ctx).await.unwrap();
        assert!(h.sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_config_error_is_reported() {
        let h = Harness::new(None);
        h.ctx.runtime.publish_result(CONFIG_ERROR);
        collect_once(&h.ctx).await.unwrap();

        let reports = h.sink.reports();
        assert_eq!(
            annotation(&reports[0], ERROR_MSG_ANNOTATION),
            Some("AIDE error: 17 Invalid configureline error")
        );
    }

    #[tokio::test]
    async fn test_failed_ok_report_is_not_fatal() {
        let h = Harness::with_sink(None, MemorySink::failing(100));
        h.ctx.runtime.publish_result(0);
        collect_once(&h.ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_log_is_uploaded_once() {
        let h = Harness::new(None);
        fs::write(h.paths().read_log(), FAILED_LOG).unwrap();

        h.ctx.runtime.publish_result(1);
        collect_once(&h.ctx).await.unwrap();
        // Same log, nothing new to read
        h.ctx.runtime.publish_result(1);
        collect_once(&h.ctx).await.unwrap();

        let reports = h.sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].data.as_ref().unwrap()[LOG_CONTENT_KEY], FAILED_LOG);
    }

    #[tokio::test]
    async fn test_forced_compression() {
        let mut h = Harness::new(None);
        Arc::get_mut(&mut h.ctx).unwrap().config.compress = true;
        fs::write(h.paths().read_log(), FAILED_LOG).unwrap();

        h.ctx.runtime.publish_result(3);
        collect_once(&h.ctx).await.unwrap();
        assert_eq!(annotation(&h.sink.reports()[0], COMPRESSED_ANNOTATION), Some(""));
    }

    #[tokio::test]
    async fn test_upload_failure_is_fatal() {
        let h = Harness::with_sink(None, MemorySink::failing(100));
        fs::write(h.paths().read_log(), FAILED_LOG).unwrap();
        h.ctx.runtime.publish_result(1);
        assert!(collect_once(&h.ctx).await.is_err());
    }
}
