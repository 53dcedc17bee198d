//! Releasable per-connection read deadline.
//!
//! Authentication arms an absolute idle deadline on every connection. Another
//! task may later clear it (a failed match delivery keeps the client alive
//! rather than abandoning it mid-offer), so the session's pending read must
//! observe the change without being cancelled and restarted.

use std::future::Future;

use tokio::sync::watch;
use tokio::time::Instant;

/// Returned when a guarded operation outlives the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("read deadline exceeded")]
pub struct DeadlineExceeded;

/// Shared absolute deadline. `None` means reads may block forever.
#[derive(Debug)]
pub struct ReadDeadline {
    tx: watch::Sender<Option<Instant>>,
}

impl ReadDeadline {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Arm the deadline at `at`.
    pub fn set(&self, at: Instant) {
        self.tx.send_replace(Some(at));
    }

    /// Remove any deadline. Wakes a guarded read that is currently waiting.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn get(&self) -> Option<Instant> {
        *self.tx.borrow()
    }

    /// Drive `fut` to completion unless the deadline passes first.
    ///
    /// `fut` is polled in place across deadline changes, so partially read
    /// data is never lost.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineExceeded> {
        tokio::pin!(fut);
        let mut rx = self.tx.subscribe();
        loop {
            let deadline = *rx.borrow_and_update();
            match deadline {
                Some(at) => tokio::select! {
                    out = &mut fut => return Ok(out),
                    _ = tokio::time::sleep_until(at) => return Err(DeadlineExceeded),
                    _ = rx.changed() => continue,
                },
                None => tokio::select! {
                    out = &mut fut => return Ok(out),
                    _ = rx.changed() => continue,
                },
            }
        }
    }
}

impl Default for ReadDeadline {
    fn default() -> Self {
        Self::new()
    }
}
