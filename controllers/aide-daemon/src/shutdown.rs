//! Shutdown signal shared by every daemon loop.

use std::time::Duration;
use tokio::sync::watch;

/// Fires the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the shutdown signal; cheap to clone into each worker
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/observer pair
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered
    pub async fn triggered(&mut self) {
        // A dropped trigger also means nobody will keep the daemon running
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration`; returns true if shutdown fired first
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            () = self.triggered() => true,
            () = tokio::time::sleep(duration) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_is_interrupted_by_trigger() {
        let (trigger, mut shutdown) = channel();
        assert!(!shutdown.sleep(Duration::from_millis(5)).await);

        let waiter = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        trigger.trigger();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_observe_the_same_signal() {
        let (trigger, shutdown) = channel();
        let mut other = shutdown.clone();
        trigger.trigger();
        other.triggered().await;
        assert!(shutdown.is_triggered());
    }
}
