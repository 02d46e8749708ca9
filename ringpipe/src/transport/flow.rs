use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::error::{Result, RingError};

/// Cancellable busy-wait used by every blocking point of the engine.
///
/// The cancellation token is polled on each iteration. Failed polls are
/// added to a caller-supplied counter so channels can profile how long
/// they stalled.
pub struct SpinWait<'a> {
    cancel: &'a CancellationToken,
    spins_before_yield: u32,
    polls: &'a AtomicU64,
}

impl<'a> SpinWait<'a> {
    pub fn new(cancel: &'a CancellationToken, spins_before_yield: u32, polls: &'a AtomicU64) -> Self {
        Self {
            cancel,
            spins_before_yield,
            polls,
        }
    }

    /// Spin until `ready` returns true.
    ///
    /// Returns `Cancelled` as soon as the token fires while `ready` is still
    /// false. `ready` must not have side effects on connection state.
    pub fn until(&self, mut ready: impl FnMut() -> bool) -> Result<()> {
        let mut spins: u32 = 0;
        loop {
            if ready() {
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(RingError::Cancelled);
            }
            self.polls.fetch_add(1, Ordering::Relaxed);
            if spins < self.spins_before_yield {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
