//! Keeps the cached FileIntegrity snapshot current.

use crate::backoff::{retry, ExponentialBackoff, Retry, MAX_RETRIES};
use crate::error::DaemonError;
use crate::runtime::DaemonRuntime;
use crate::snapshot::InstanceSnapshot;
use crds::FileIntegrity;
use futures::{Stream, StreamExt};
use kube::Api;
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetch the owner, then follow it with a watch.
///
/// Only returns on error; the watch stream ending is fatal too.
pub async fn run(
    api: Api<FileIntegrity>,
    name: String,
    runtime: Arc<DaemonRuntime>,
    backoff: ExponentialBackoff,
) -> Result<(), DaemonError> {
    info!("fetching FileIntegrity {}", name);
    let fi = {
        let api = &api;
        let name = name.as_str();
        retry("get FileIntegrity", backoff, MAX_RETRIES, move || async move {
            api.get(name).await.map_err(Retry::Transient)
        })
        .await?
    };
    runtime.set_instance(InstanceSnapshot::try_from(&fi)?);

    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
    let stream = watcher::watcher(api, config).default_backoff();
    drive(stream, &runtime).await
}

/// Publish every object seen on `stream`
pub async fn drive<S>(stream: S, runtime: &DaemonRuntime) -> Result<(), DaemonError>
where
    S: Stream<Item = Result<Event<FileIntegrity>, watcher::Error>>,
{
    let mut stream = pin!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Apply(fi) | Event::InitApply(fi) | Event::Delete(fi)) => {
                match InstanceSnapshot::try_from(&fi) {
                    Ok(snapshot) => runtime.set_instance(snapshot),
                    Err(e) => warn!("ignoring FileIntegrity update: {}", e),
                }
            }
            Ok(Event::Init) => debug!("FileIntegrity watch (re)listing"),
            Ok(Event::InitDone) => debug!("FileIntegrity watch initialization complete"),
            Err(e) => warn!("FileIntegrity watch error: {}", e),
        }
    }
    Err(DaemonError::Watch("FileIntegrity watch stream ended".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::file_integrity;
    use crds::NodeScope;

    #[tokio::test]
    async fn test_drive_publishes_and_fails_when_stream_ends() {
        let runtime = DaemonRuntime::new();
        let mut invalid = file_integrity(None);
        invalid.metadata.uid = None;

        let events: Vec<Result<Event<FileIntegrity>, watcher::Error>> = vec![
            Ok(Event::Init),
            Ok(Event::InitApply(file_integrity(None))),
            Ok(Event::InitDone),
            Ok(Event::Apply(file_integrity(Some("")))),
            Ok(Event::Apply(invalid)),
        ];

        let result = drive(futures::stream::iter(events), &runtime).await;
        assert!(matches!(result, Err(DaemonError::Watch(_))));

        let latest = runtime.try_instance().unwrap();
        assert_eq!(latest.hold_off, Some(NodeScope::All), "invalid object was skipped");
    }
}
