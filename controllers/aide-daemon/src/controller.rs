//! Daemon supervisor.
//!
//! Starts every loop, waits for the first fatal error or a shutdown
//! signal, then stops the loops and waits for them to finish. The
//! instance watch is aborted rather than awaited.

use crate::backoff::ExponentialBackoff;
use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::loops::{self, LoopContext};
use crate::report::{KubeReportSink, Reporter};
use crate::runtime::DaemonRuntime;
use crate::shutdown::{self, Shutdown};
use aide::AideCommand;
use crds::FileIntegrity;
use futures::future::{BoxFuture, FutureExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use kube_runtime::events::{Recorder, Reporter as EventReporter};
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

type Worker = BoxFuture<'static, Result<(), DaemonError>>;

/// Controller name on the events this daemon records
const EVENT_REPORTER: &str = "file-integrity-daemon";

/// Main controller for one node's AIDE daemon.
pub struct Controller {
    ctx: Arc<LoopContext>,
    instance_watch: Option<Worker>,
}

impl Controller {
    /// Wire the daemon to the cluster and the real aide binary.
    pub fn new(config: DaemonConfig, client: Client) -> Self {
        info!("Initializing AIDE daemon for FileIntegrity {}/{}", config.namespace, config.owner);

        let runtime = Arc::new(DaemonRuntime::new());
        let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &config.namespace);
        let file_integrities: Api<FileIntegrity> = Api::namespaced(client.clone(), &config.namespace);

        let events = EventReporter {
            controller: EVENT_REPORTER.to_string(),
            instance: Some(config.node_name.clone()),
        };
        let recorder = Recorder::new(client, events);

        let reporter = Reporter::new(
            Arc::new(KubeReportSink::new(config_maps, recorder)),
            Arc::clone(&runtime),
            config.report_prefix.clone(),
            config.node_name.clone(),
        );
        let aide = AideCommand::new(&config.aide_binary, config.paths.config());

        let instance_watch = loops::instance_watch::run(
            file_integrities,
            config.owner.clone(),
            Arc::clone(&runtime),
            ExponentialBackoff::default(),
        )
        .boxed();

        let ctx = LoopContext::new(runtime, config, Arc::new(aide), reporter);
        Self::from_context(Arc::new(ctx)).with_instance_watch(instance_watch)
    }

    /// Supervise loops sharing `ctx`, without an instance watch
    pub fn from_context(ctx: Arc<LoopContext>) -> Self {
        Self {
            ctx,
            instance_watch: None,
        }
    }

    /// Keep the owner snapshot current with `watch`.
    ///
    /// Its error stops the daemon; on shutdown it is aborted.
    #[must_use]
    pub fn with_instance_watch(mut self, watch: Worker) -> Self {
        self.instance_watch = Some(watch);
        self
    }

    /// Runs the daemon until `signal` resolves or a loop fails.
    ///
    /// Returns the first fatal error.
    pub async fn run<S>(self, signal: S) -> Result<(), DaemonError>
    where
        S: Future<Output = ()>,
    {
        info!("AIDE daemon running");

        let (trigger, shutdown) = shutdown::channel();
        let (errors_tx, mut errors) = mpsc::channel::<DaemonError>(8);

        let mut workers = JoinSet::new();
        let starters: [(&str, fn(Arc<LoopContext>, Shutdown) -> Worker); 4] = [
            ("re-init", |ctx, s| loops::reinit::run(ctx, s).boxed()),
            ("hold-off", |ctx, s| loops::holdoff::run(ctx, s).boxed()),
            ("scan", |ctx, s| loops::scan::run(ctx, s).boxed()),
            ("log collector", |ctx, s| loops::collector::run(ctx, s).boxed()),
        ];
        for (name, start) in starters {
            let worker = start(Arc::clone(&self.ctx), shutdown.clone());
            let tx = errors_tx.clone();
            workers.spawn(async move {
                if let Err(e) = worker.await {
                    error!("{} loop failed: {}", name, e);
                    let _ = tx.send(e).await;
                }
            });
        }

        let instance_watch = self.instance_watch.map(|watch| {
            let tx = errors_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = watch.await {
                    error!("instance watch failed: {}", e);
                    let _ = tx.send(e).await;
                }
            })
        });
        drop(errors_tx);

        let mut signal = pin!(signal);
        let first_error = loop {
            tokio::select! {
                Some(e) = errors.recv() => break Some(e),
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        break Some(DaemonError::Task(e.to_string()));
                    }
                }
                () = &mut signal => {
                    info!("shutdown signal received");
                    break None;
                }
            }
        };

        info!("stopping the AIDE daemon");
        trigger.trigger();
        if let Some(watch) = instance_watch {
            watch.abort();
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("worker did not stop cleanly: {}", e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
