use std::sync::{Arc, Mutex, PoisonError, Weak};

use crossbeam::channel::{self, Receiver, Sender};
use tokio::sync::watch;

/// Caller-owned cancellation flag shared with a running turn.
///
/// Setting it is idempotent and may happen from any thread or task, including
/// before the turn starts (the process is then never spawned). The turn only
/// observes the flag while waiting for the next output line.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    tx: watch::Sender<bool>,
    blocking_waiters: Mutex<Vec<WaiterSlot>>,
}

struct WaiterSlot {
    tx: Sender<()>,
    alive: Weak<()>,
}

/// Receiving end handed to a blocking reader. Dropping it unregisters the
/// waiter the next time one is added.
pub(crate) struct BlockingWaiter {
    rx: Receiver<()>,
    _alive: Arc<()>,
}

impl BlockingWaiter {
    /// A waiter that never fires, for turns without a signal.
    pub(crate) fn never() -> Self {
        Self {
            rx: channel::never(),
            _alive: Arc::new(()),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(SignalInner {
                tx,
                blocking_waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        let mut waiters = self
            .inner
            .blocking_waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let was_cancelled = self.inner.tx.send_replace(true);
        if !was_cancelled {
            for waiter in waiters.drain(..) {
                let _ = waiter.tx.try_send(());
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Resolves once the signal is set; immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Returns a waiter whose receiver becomes ready when the signal is set.
    ///
    /// Used by the blocking line source inside `crossbeam::select!`.
    pub(crate) fn blocking_waiter(&self) -> BlockingWaiter {
        let (tx, rx) = channel::bounded(1);
        let alive = Arc::new(());
        let mut waiters = self
            .inner
            .blocking_waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        waiters.retain(|waiter| waiter.alive.strong_count() > 0);
        if self.is_cancelled() {
            let _ = tx.try_send(());
        } else {
            waiters.push(WaiterSlot {
                tx,
                alive: Arc::downgrade(&alive),
            });
        }
        BlockingWaiter { rx, _alive: alive }
    }

    #[cfg(test)]
    fn registered_waiters(&self) -> usize {
        self.inner
            .blocking_waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
