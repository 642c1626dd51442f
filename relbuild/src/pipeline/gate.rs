//! One-shot readiness gates.

use tokio::sync::watch;

/// Orchestrator side of a step's readiness flag.
///
/// Monotonic: once opened it stays open. Only the orchestrator holds a `Gate`.
#[derive(Debug)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

/// Worker side of a gate.
#[derive(Debug, Clone)]
pub struct GateWaiter {
    rx: watch::Receiver<bool>,
}

impl Gate {
    /// Creates a gate, already open when `open` is true.
    #[must_use]
    pub fn new(open: bool) -> (Self, GateWaiter) {
        let (tx, rx) = watch::channel(open);
        (Self { tx }, GateWaiter { rx })
    }

    /// Opens the gate. Opening twice is a no-op.
    pub fn open(&self) {
        self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        });
    }

    /// Whether the gate has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }
}

impl GateWaiter {
    /// Waits until the gate opens. Returns false if the gate was dropped
    /// while still closed.
    pub async fn wait(&mut self) -> bool {
        self.rx.wait_for(|open| *open).await.is_ok()
    }

    /// Whether the gate has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.rx.borrow()
    }
}
