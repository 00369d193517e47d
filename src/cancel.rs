//! Cooperative cancellation for in-flight interpretations.
//!
//! The interpreter checks its token between states, races pending `Wait`
//! delays against it, stops launching Map items once it flips, and the
//! catalog watches it while draining result streams. Map and Parallel
//! sub-interpretations share the owning run's token, so one signal stops
//! the whole tree. Whoever cancels records why; the reason travels into
//! the run's terminal error so the orchestrator can report what stopped
//! the workflow.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A cloneable handle used to stop a run and everything it spawned.
///
/// All clones share one flag: cancelling any of them makes every clone
/// observe `is_cancelled() == true`. Cancellation is level-triggered and
/// idempotent; the first recorded reason wins.
#[derive(Clone)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

struct Shared {
    flag: watch::Sender<bool>,
    reason: Mutex<Option<String>>,
}

impl CancellationToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                flag,
                reason: Mutex::new(None),
            }),
        }
    }

    /// Signals cancellation, recording why. Later calls keep the first
    /// reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self
                .shared
                .reason
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        let _ = self.shared.flag.send(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.shared.flag.borrow()
    }

    /// The reason recorded by the first cancel, if any.
    pub fn reason(&self) -> Option<String> {
        self.shared
            .reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolves when the token is cancelled; immediately if it already is.
    pub async fn cancelled(&self) {
        let mut watched = self.shared.flag.subscribe();
        if *watched.borrow() {
            return;
        }
        // The sender lives in `self.shared`, so `changed` cannot error
        // while this borrow is alive.
        while watched.changed().await.is_ok() {
            if *watched.borrow() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
