//! Shutdown coordination.
//!
//! # Design Decisions
//! - Backed by a `watch` flag: a listener that subscribes after the trigger
//!   still observes it
//! - Triggering is idempotent
//! - If the coordinator is dropped untriggered, listeners wait forever; only
//!   OS signals can stop the server then

use std::future;

use tokio::sync::watch;

/// Owner of the process-wide shutdown flag.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// A handle that resolves once shutdown is triggered.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Raise the flag.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Wait until the flag is raised.
    pub async fn recv(&mut self) {
        let raised = self.rx.wait_for(|raised| *raised).await.is_ok();
        if !raised {
            future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_trigger_reaches_every_listener() {
        let shutdown = Shutdown::new();
        let mut first = shutdown.subscribe();
        let mut second = first.clone();

        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        first.recv().await;
        second.recv().await;
    }

    #[tokio::test]
    async fn test_late_listener_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut late = shutdown.subscribe();
        timeout(Duration::from_millis(100), late.recv())
            .await
            .expect("trigger must be visible to late listeners");
    }

    #[tokio::test]
    async fn test_listener_waits_until_triggered() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();

        assert!(timeout(Duration::from_millis(50), listener.recv())
            .await
            .is_err());
        assert!(!shutdown.is_triggered());
    }
}
