//! Run-scoped cancellation.
//!
//! A [`ShutdownTrigger`] owns the sending side of a broadcast channel; every
//! component that must stop promptly holds its own [`Shutdown`] listener.
//! Dropping the trigger counts as firing it.

use tokio::sync::broadcast;

/// Fires the shutdown signal for every listener created from it.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    notify: broadcast::Sender<()>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }

    /// Creates a listener that observes every trigger fired after this call.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown::new(self.notify.subscribe())
    }

    pub fn trigger(&self) {
        // No listeners is not an error: nothing is left to stop.
        let _ = self.notify.send(());
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for the shutdown signal.
///
/// Once the signal has been observed, `recv` completes immediately on every
/// subsequent call.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Self {
        Self {
            is_shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Waits for the shutdown signal. Cancel safe.
    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        // Lagged and Closed both mean a trigger fired or vanished.
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn trigger_wakes_every_listener() {
        let trigger = ShutdownTrigger::new();
        let mut a = trigger.subscribe();
        let mut b = trigger.subscribe();

        trigger.trigger();

        timeout(Duration::from_secs(1), a.recv()).await.unwrap();
        timeout(Duration::from_secs(1), b.recv()).await.unwrap();
        assert!(a.is_shutdown() && b.is_shutdown());
    }

    #[tokio::test]
    async fn observed_shutdown_is_sticky() {
        let trigger = ShutdownTrigger::new();
        let mut shutdown = trigger.subscribe();
        trigger.trigger();
        shutdown.recv().await;

        timeout(Duration::from_millis(50), shutdown.recv())
            .await
            .expect("second recv must return immediately");
    }

    #[tokio::test]
    async fn dropping_the_trigger_counts_as_shutdown() {
        let trigger = ShutdownTrigger::new();
        let mut shutdown = trigger.subscribe();
        drop(trigger);

        timeout(Duration::from_secs(1), shutdown.recv()).await.unwrap();
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn pending_until_triggered() {
        let trigger = ShutdownTrigger::new();
        let mut shutdown = trigger.subscribe();

        assert!(timeout(Duration::from_millis(20), shutdown.recv()).await.is_err());
        assert!(!shutdown.is_shutdown());
    }
}
