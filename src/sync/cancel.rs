/*!
 * Cancellation Tokens
 *
 * Cooperative cancellation for blocking acquisitions. A token is
 * cheaply cloneable; every clone observes the same cancelled flag.
 * Waiters register their park address with the token for the duration
 * of the park, so `cancel` can wake exactly the queues that contain
 * interested waiters. Registration is guard-based and survives panics.
 */

use parking_lot::Mutex;
use parking_lot_core::{unpark_all, UnparkToken};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation handle accepted by the interruptible lock operations.
///
/// Cancelling a token interrupts every waiter currently blocked through
/// it; the waiters leave their queues with the synchronizer state
/// unchanged and return `Err(Interrupted)`. Cancellation is permanent:
/// a cancelled token fails all future interruptible waits immediately.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    /// Park addresses with a registered waiter. Duplicates are kept so
    /// that two waiters on one queue each hold their own entry.
    parked: Mutex<Vec<usize>>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels the token and wakes every registered waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let addrs = self.inner.parked.lock().clone();
        for addr in addrs {
            // Waking a whole queue is deliberate: uninterested waiters
            // revalidate and park again.
            unsafe {
                unpark_all(addr, UnparkToken(0));
            }
        }
    }

    /// Registers a waiter about to park on `addr`. The registration is
    /// dropped when the returned guard is, on every exit path.
    pub(crate) fn register(&self, addr: usize) -> Registration<'_> {
        self.inner.parked.lock().push(addr);
        Registration { token: self, addr }
    }
}

pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    addr: usize,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut parked = self.token.inner.parked.lock();
        if let Some(pos) = parked.iter().position(|&a| a == self.addr) {
            parked.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_sticky() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn test_registration_guard_unregisters() {
        let token = CancelToken::new();
        {
            let _a = token.register(0x1000);
            let _b = token.register(0x1000);
            assert_eq!(token.inner.parked.lock().len(), 2);
        }
        assert!(token.inner.parked.lock().is_empty());
    }
}
