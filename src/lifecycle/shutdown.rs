//! Shutdown coordination for background loops.
//!
//! Shutdown is a level, not an edge: a loop that subscribes after
//! [`Shutdown::trigger`] still sees it and exits on its first poll.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Receiving half held by every long-running loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every current and future subscriber. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of loops still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    ///
    /// Also resolves when the coordinator is dropped, since nothing can
    /// trigger it any more.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);
        assert!(!a.is_triggered());

        shutdown.trigger();
        shutdown.trigger();
        a.recv().await;
        b.recv().await;
        assert!(shutdown.is_triggered());

        drop(a);
        assert_eq!(shutdown.receiver_count(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut late = shutdown.subscribe();
        assert!(late.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), late.recv())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_loops() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
        assert!(!signal.is_triggered());
    }
}
