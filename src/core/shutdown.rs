// src/core/shutdown.rs — Run-wide cancellation

use tokio::sync::watch;

/// Owner side of the run's stop flag. Cloneable signals are handed to workers.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Observer side, one per worker.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown. Returns true only for the first call.
    pub fn trigger(&self) -> bool {
        let first = !self.tx.send_replace(true);
        if first {
            tracing::info!("Shutdown requested");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger on Ctrl+C. The listener task ends with the runtime.
    pub fn trigger_on_ctrl_c(self: &std::sync::Arc<Self>) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping workers");
                shutdown.trigger();
            }
        });
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered. Pends forever if the owner is
    /// dropped without triggering.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_once() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        assert!(!signal.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(signal.is_triggered());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_subscribed_after_trigger_sees_it() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut signal = shutdown.signal();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_cancelled_pending_until_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        let mut waiter = tokio_test::task::spawn(async move { signal.cancelled().await });
        tokio_test::assert_pending!(waiter.poll());

        shutdown.trigger();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[test]
    fn test_dropped_owner_stays_pending() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        drop(shutdown);
        let mut waiter = tokio_test::task::spawn(async move { signal.cancelled().await });
        tokio_test::assert_pending!(waiter.poll());
    }
}
