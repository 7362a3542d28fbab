//! Batch progress snapshots and cooperative cancellation.
//!
//! [`BatchProgress`] summarises a [`BatchBoard`](crate::BatchBoard) for
//! display, and [`CancellationToken`] lets a caller abandon in-flight
//! extraction or batch work.
//!
//! # Example
//!
//! ```
//! use endframe::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let observer = token.clone();
//!
//! token.cancel();
//! assert!(observer.is_cancelled());
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// Aggregate progress of a batch run.
///
/// Only `COMPLETED` items count towards [`percentage`](BatchProgress::percentage);
/// failed items are reported separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchProgress {
    /// Number of items in the batch.
    pub total: usize,
    /// Items that reached `COMPLETED`.
    pub completed: usize,
    /// Items that reached `ERROR`.
    pub failed: usize,
    /// Items still `PENDING` or `PROCESSING`.
    pub pending: usize,
    /// `round(completed / total * 100)`, or 0 for an empty batch.
    pub percentage: u8,
}

impl BatchProgress {
    pub(crate) fn from_counts(total: usize, completed: usize, failed: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            total,
            completed,
            failed,
            pending: total.saturating_sub(completed + failed),
            percentage,
        }
    }

    /// Number of items that reached a terminal state.
    pub fn settled(&self) -> usize {
        self.completed + self.failed
    }
}

/// Cooperative cancellation token.
///
/// Clones share state. The extractor checks the token at every state
/// boundary and also races it against each wait, so cancellation takes
/// effect without waiting for a timeout to elapse.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
