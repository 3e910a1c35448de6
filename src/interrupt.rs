//! Cancellation shared between the signal handler and the stream loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

/// A resettable interrupt.
///
/// The signal handler calls [`Interrupt::trigger`]; the turn loop selects on the token
/// [`Interrupt::arm`] hands out when the turn starts.  A cancelled token cannot be
/// un-cancelled, so arming swaps in a fresh one.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: Arc<Mutex<CancellationToken>>,
    armed: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create an interrupt with no turn running.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fire the interrupt.  Safe to call from any thread, any number of times.
    ///
    /// Returns false when no turn was running to receive it.
    pub fn trigger(&self) -> bool {
        self.lock().cancel();
        self.armed.load(Ordering::SeqCst)
    }

    /// Start a turn and return the token it should watch.
    pub fn arm(&self) -> CancellationToken {
        let mut token = self.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        self.armed.store(true, Ordering::SeqCst);
        token.clone()
    }

    /// End the turn.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}
