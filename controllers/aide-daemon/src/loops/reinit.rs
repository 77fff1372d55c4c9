//! Database (re-)initialization.
//!
//! Runs `aide -i` when the read database is missing or empty, or when a
//! re-init marker has been dropped on the node. Scans stay off while this
//! is in progress.

use super::LoopContext;
use crate::backoff::{retry, Retry, MAX_RETRIES};
use crate::error::DaemonError;
use crate::runtime::DaemonRuntime;
use crate::shutdown::Shutdown;
use aide::exit::IO_ERROR;
use aide::{files, AideError};
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info};

const LOOP: &str = "reinitLoop";

/// Keeps `initializing` set for as long as it lives
struct Initializing<'a> {
    runtime: &'a DaemonRuntime,
}

impl<'a> Initializing<'a> {
    fn start(runtime: &'a DaemonRuntime) -> Self {
        runtime.set_initializing(LOOP, true);
        Self { runtime }
    }
}

impl Drop for Initializing<'_> {
    fn drop(&mut self) {
        self.runtime.set_initializing(LOOP, false);
    }
}

pub async fn run(ctx: Arc<LoopContext>, mut shutdown: Shutdown) -> Result<(), DaemonError> {
    info!("starting the re-init loop");
    loop {
        match needs_init(&ctx) {
            Ok(true) => initialize(&ctx).await?,
            Ok(false) => ctx.runtime.set_initializing(LOOP, false),
            Err(e) => {
                ctx.reporter
                    .log_and_report_error("Error checking the AIDE DB", &e)
                    .await;
                return Err(e);
            }
        }

        if shutdown.sleep(ctx.poll_interval).await {
            debug!("re-init loop stopping");
            return Ok(());
        }
    }
}

fn needs_init(ctx: &LoopContext) -> Result<bool, DaemonError> {
    let paths = &ctx.config.paths;
    if files::is_missing_or_empty(&paths.read_db())? {
        info!("AIDE database {} is missing or empty", paths.read_db().display());
        return Ok(true);
    }
    if files::reinit_requested(paths)? {
        info!("AIDE re-init requested");
        return Ok(true);
    }
    Ok(false)
}

/// Build and promote a fresh database.
///
/// Any failure is reported and returned as fatal.
async fn initialize(ctx: &LoopContext) -> Result<(), DaemonError> {
    let _initializing = Initializing::start(&ctx.runtime);

    let result = async {
        let _files = ctx.runtime.lock_files(LOOP).await;
        let paths = &ctx.config.paths;

        files::back_up_aide_files(paths, ctx.config.max_backups, Local::now())?;

        let aide = ctx.aide.as_ref();
        retry("aide init", ctx.init_backoff.clone(), MAX_RETRIES, move || async move {
            match aide.init().await {
                Ok(exit) if exit.is_success() => Ok(()),
                Ok(exit) if exit.code() == IO_ERROR => Err(Retry::Transient(AideError::Exit(exit))),
                Ok(exit) => Err(Retry::Permanent(AideError::Exit(exit))),
                Err(e) => Err(Retry::Permanent(e)),
            }
        })
        .await?;

        files::promote_db(paths)?;
        files::remove_reinit_markers(paths)?;
        Ok::<(), DaemonError>(())
    }
    .await;

    match result {
        Ok(()) => {
            info!("AIDE database initialized");
            Ok(())
        }
        Err(e) => {
            ctx.reporter
                .log_and_report_error("Error initializing the AIDE DB", &e)
                .await;
            Err(DaemonError::Init(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::tests::Harness;
    use crate::report::tests::annotation;
    use crate::shutdown;
    use aide::InvocationKind;
    use crds::ERROR_MSG_ANNOTATION;
    use std::fs;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_db_is_initialized_once() {
        let h = Harness::new(None);
        let (trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(run(Arc::clone(&h.ctx), shutdown));

        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();
        task.await.unwrap().unwrap();

        assert_eq!(h.aide.count(InvocationKind::Init), 1);
        assert_eq!(fs::read(h.paths().read_db()).unwrap(), b"aide-db");
        assert!(!h.ctx.runtime.initializing());
    }

    #[tokio::test]
    async fn test_existing_db_clears_initializing_without_init() {
        let h = Harness::new(None);
        fs::write(h.paths().read_db(), b"db").unwrap();
        assert!(h.ctx.runtime.initializing());

        let (trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(run(Arc::clone(&h.ctx), shutdown));
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        task.await.unwrap().unwrap();

        assert_eq!(h.aide.count(InvocationKind::Init), 0);
        assert!(!h.ctx.runtime.initializing());
    }

    #[tokio::test]
    async fn test_marker_triggers_reinit_and_is_removed() {
        let h = Harness::new(None);
        fs::write(h.paths().read_db(), b"old-db").unwrap();
        fs::write(h.paths().read_log(), b"old log").unwrap();
        fs::write(h.paths().legacy_reinit_marker(), b"").unwrap();

        initialize(&h.ctx).await.unwrap();

        assert_eq!(fs::read(h.paths().read_db()).unwrap(), b"aide-db");
        assert!(!h.paths().legacy_reinit_marker().exists());
        assert!(!h.paths().reinit_marker().exists());

        let backups = fs::read_dir(h.dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".backup-"))
            .count();
        assert_eq!(backups, 2, "one backup each of the DB and the log");
    }

    #[tokio::test]
    async fn test_transient_init_failure_is_retried() {
        let h = Harness::new(None);
        h.aide.push_init_code(IO_ERROR);
        h.aide.push_init_code(0);

        initialize(&h.ctx).await.unwrap();
        assert_eq!(h.aide.count(InvocationKind::Init), 2);
    }

    #[tokio::test]
    async fn test_init_failure_is_reported_and_fatal() {
        let h = Harness::new(None);
        h.aide.push_init_code(17);

        let err = initialize(&h.ctx).await.unwrap_err();
        assert!(matches!(err, DaemonError::Init(_)));
        assert_eq!(h.aide.count(InvocationKind::Init), 1, "only I/O errors are retried");
        assert!(!h.ctx.runtime.initializing());

        let reports = h.sink.reports();
        assert_eq!(reports.len(), 1);
        assert!(annotation(&reports[0], ERROR_MSG_ANNOTATION)
            .unwrap()
            .starts_with("Error initializing the AIDE DB"));
    }
}
