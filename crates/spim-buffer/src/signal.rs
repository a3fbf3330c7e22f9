//! Set/clear/await signals for producer-consumer hand-off.

use std::sync::Arc;
use tokio::sync::watch;

/// A boolean flag that can be awaited in either direction.
///
/// Replaces polled spin-waits at the writer/process bridge: the producer
/// awaits [`wait_set`](Self::wait_set)/[`wait_clear`](Self::wait_clear)
/// instead of sleeping in a loop, while keeping the same ordering guarantee
/// (the producer does not proceed until the consumer has signalled).
///
/// Clones share state; a writer exposes a clone of its "done reading" signal
/// and a process a clone of its "new image" signal.
#[derive(Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is set. Returns immediately if already set.
    pub async fn wait_set(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|set| *set).await;
    }

    /// Resolves once the signal is clear. Returns immediately if already clear.
    pub async fn wait_clear(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|set| !*set).await;
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("set", &self.is_set()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn set_and_clear_are_observable() {
        let signal = Signal::new(false);
        assert!(!signal.is_set());

        signal.set();
        assert!(signal.is_set());
        signal.wait_set().await;

        signal.clear();
        assert!(!signal.is_set());
        signal.wait_clear().await;
    }

    #[tokio::test]
    async fn waiter_wakes_on_transition() {
        let signal = Signal::new(false);
        let waiter = signal.clone();

        let handle = tokio::spawn(async move {
            waiter.wait_set().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.set();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = Signal::new(true);
        let b = a.clone();
        b.clear();
        assert!(!a.is_set());
    }
}
