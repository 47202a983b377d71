/*!
 * Condition Queues
 *
 * A secondary wait queue attached to an exclusive-mode synchronizer.
 * Waiting fully releases the lock (however many reentrant holds the
 * caller has stacked), parks on the condition's own queue, and
 * re-acquires the saved holds before returning. Notifying moves
 * waiters onto the synchronizer's main queue without releasing the
 * lock; they run when the notifier eventually unlocks.
 *
 * The waiter enqueues itself *before* the lock is released (the
 * release runs in the park `before_sleep` callback, after the queue
 * insertion). A notifier must hold the lock, so by the time it can
 * run, every waiter that released ahead of it is already queued and
 * no notification can fall between release and enqueue.
 */

use super::cancel::CancelToken;
use super::queue::QueueSync;
use super::traits::{SyncPolicy, WaitResult};
use crate::errors::{Interrupted, NOT_HELD};
use parking_lot_core::{park, unpark_requeue, ParkResult, ParkToken, RequeueOp, UnparkToken};
use std::time::{Duration, Instant};

/// Request builder: maps a raw saved state word to the policy request
/// that fully releases it and later restores it.
type SavedRequest<P> = Box<dyn Fn(u32) -> <P as SyncPolicy>::Request + Send + Sync>;

/// A condition queue bound to an exclusive lock handle.
///
/// All operations require the caller to hold the lock exclusively (as
/// the principal the originating handle identifies) and panic
/// otherwise. One condition instance must be shared by its waiters and
/// notifiers; share it by reference (scoped threads) or inside an
/// `Arc` together with its lock.
pub struct Condition<'a, P: SyncPolicy> {
    sync: &'a QueueSync<P>,
    saved_request: SavedRequest<P>,
}

impl<'a, P: SyncPolicy> Condition<'a, P> {
    pub(crate) fn new(sync: &'a QueueSync<P>, saved_request: SavedRequest<P>) -> Self {
        Self {
            sync,
            saved_request,
        }
    }

    /// Queue key for this condition. Waiters hold `&self` while
    /// parked, so the address cannot move under them.
    #[inline]
    fn park_addr(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// Verifies holdership and returns the raw state word to save.
    fn assert_held(&self) -> u32 {
        let s = self.sync.state();
        let probe = (self.saved_request)(s);
        if !self
            .sync
            .policy()
            .held_exclusively(self.sync.state_atomic(), probe)
        {
            panic!("{}", NOT_HELD);
        }
        s
    }

    /// Releases the lock completely, waits to be notified, and
    /// re-acquires the same number of holds before returning.
    pub fn wait(&self) {
        let woken = self
            .wait_inner(None, None)
            .expect("wait without a token cannot be interrupted");
        debug_assert!(woken, "wait without a deadline cannot time out");
    }

    /// As [`wait`](Self::wait), but bounded. Returns `false` if the
    /// wait timed out before a notification arrived. The lock is held
    /// again on return in either case.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_inner(Some(Instant::now() + timeout), None)
            .expect("wait without a token cannot be interrupted")
    }

    /// As [`wait`](Self::wait), but abandons the wait when `token` is
    /// cancelled. The lock is held again when the error returns.
    pub fn wait_interruptibly(&self, token: &CancelToken) -> WaitResult<()> {
        self.wait_inner(None, Some(token)).map(|woken| {
            debug_assert!(woken, "wait without a deadline cannot time out");
        })
    }

    fn wait_inner(
        &self,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> WaitResult<bool> {
        let saved = self.assert_held();
        let req = (self.saved_request)(saved);

        let registration = token.map(|t| t.register(self.park_addr()));
        // Safety: key is our own address, pinned by the `&self` borrow
        // for the duration of the park; before_sleep runs outside the
        // queue-bucket lock and may therefore unpark.
        let result = unsafe {
            park(
                self.park_addr(),
                || !token.is_some_and(CancelToken::is_cancelled),
                || {
                    let fully = self.sync.release_exclusive(req);
                    debug_assert!(fully, "a full release must clear the state");
                },
                |_, _| {},
                ParkToken(0),
                deadline,
            )
        };
        drop(registration);

        if let ParkResult::Invalid = result {
            // Cancelled before enqueueing; the lock was never released.
            return Err(Interrupted);
        }

        self.sync.acquire_exclusive(req);

        if token.is_some_and(CancelToken::is_cancelled) {
            return Err(Interrupted);
        }
        Ok(!matches!(result, ParkResult::TimedOut))
    }

    /// Moves one waiter to the lock's main queue. Does not release the
    /// lock; the waiter proceeds once the lock is next released.
    pub fn notify_one(&self) {
        self.assert_held();
        self.requeue(RequeueOp::RequeueOne);
    }

    /// Moves every waiter to the lock's main queue.
    pub fn notify_all(&self) {
        self.assert_held();
        self.requeue(RequeueOp::RequeueAll);
    }

    fn requeue(&self, op: RequeueOp) {
        // Safety: both keys are addresses of live, pinned memory.
        unsafe {
            unpark_requeue(
                self.park_addr(),
                self.sync.park_addr(),
                || op,
                |_, _| UnparkToken(0),
            );
        }
    }
}
