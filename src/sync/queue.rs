/*!
 * Queue-Based Synchronizer
 *
 * The substrate every primitive in this crate is built on: a single
 * 32-bit atomic state word plus a blocking wait queue. The meaning of
 * "acquire" is supplied by a [`SyncPolicy`]; this module supplies
 * parking, wakeups, timeouts, and cancellation.
 *
 * # Design: Address-Keyed Parking Over Hand-Rolled Queues
 *
 * Waiters park through `parking_lot_core` on the address of the state
 * word, the same mechanism the platform mutexes use. The policy
 * predicate is re-evaluated inside the park `validate` callback, which
 * runs under the queue-bucket lock; a release that beats the waiter to
 * the bucket is therefore observed before the waiter sleeps, and one
 * that loses finds the waiter enqueued. This closes the classic
 * missed-wakeup window without a dedicated "parked" bit.
 *
 * The synchronizer is non-fair: a newly arriving contender may succeed
 * ahead of queued waiters that have just been woken.
 */

use super::cancel::CancelToken;
use super::traits::{SyncPolicy, TryAcquire, WaitResult};
use crate::errors::{Interrupted, NOT_HELD};
use parking_lot_core::{park, unpark_all, unpark_one, ParkResult, ParkToken, UnparkToken};
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Queue-based synchronizer: one atomic state word, one wait queue,
/// transition semantics supplied by `P`.
pub struct QueueSync<P: SyncPolicy> {
    state: AtomicU32,
    policy: P,
}

impl<P: SyncPolicy> QueueSync<P> {
    /// Creates a synchronizer in the fully-released state (state 0).
    pub fn new(policy: P) -> Self {
        Self {
            state: AtomicU32::new(0),
            policy,
        }
    }

    /// Snapshot of the raw state word.
    #[inline]
    pub fn state(&self) -> u32 {
        self.state.load(Ordering::Acquire)
    }

    /// The policy supplying this synchronizer's transition semantics.
    #[inline]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    #[inline]
    pub(crate) fn state_atomic(&self) -> &AtomicU32 {
        &self.state
    }

    /// Queue key. Stable for as long as callers hold `&self`, which is
    /// exactly as long as anyone can be parked on it.
    #[inline]
    pub(crate) fn park_addr(&self) -> usize {
        &self.state as *const AtomicU32 as usize
    }

    // ---- shared path -----------------------------------------------------

    /// Acquires in shared mode, blocking until the policy admits the
    /// request. Panics on count overflow.
    pub fn acquire_shared(&self, req: P::Request) {
        let attempt = || self.policy.try_acquire_shared(&self.state, req);
        let acquired = self
            .acquire_slow(attempt, None, None)
            .expect("acquire without a token cannot be interrupted");
        debug_assert!(acquired, "acquire without a deadline cannot time out");
    }

    /// Acquires in shared mode, blocking until admitted or until
    /// `token` is cancelled.
    pub fn acquire_shared_interruptibly(
        &self,
        req: P::Request,
        token: &CancelToken,
    ) -> WaitResult<()> {
        let attempt = || self.policy.try_acquire_shared(&self.state, req);
        self.acquire_slow(attempt, None, Some(token)).map(|acquired| {
            debug_assert!(acquired, "acquire without a deadline cannot time out");
        })
    }

    /// One shared attempt; never parks.
    pub fn try_acquire_shared(&self, req: P::Request) -> bool {
        let outcome = self.policy.try_acquire_shared(&self.state, req);
        if outcome == TryAcquire::Overflow {
            panic!("{}", self.policy.overflow_message());
        }
        outcome.is_acquired()
    }

    /// Shared acquire bounded by `timeout`. `Ok(false)` on timeout.
    pub fn try_acquire_shared_for(
        &self,
        req: P::Request,
        timeout: Duration,
        token: &CancelToken,
    ) -> WaitResult<bool> {
        let attempt = || self.policy.try_acquire_shared(&self.state, req);
        self.acquire_slow(attempt, Some(Instant::now() + timeout), Some(token))
    }

    /// Releases a shared hold. Returns true iff the state returned to
    /// fully free, in which case all queued contenders are woken after
    /// the state-clearing CAS. Panics if the caller does not hold the
    /// lock in the released mode.
    pub fn release_shared(&self, req: P::Request) -> bool {
        match self.policy.try_release_shared(&self.state, req) {
            Ok(true) => {
                self.wake_all();
                true
            }
            Ok(false) => false,
            Err(_) => panic!("{}", NOT_HELD),
        }
    }

    // ---- exclusive path --------------------------------------------------

    /// Acquires in exclusive mode, blocking until the policy admits the
    /// request. Panics on count overflow.
    pub fn acquire_exclusive(&self, req: P::Request) {
        let attempt = || self.policy.try_acquire_exclusive(&self.state, req);
        let acquired = self
            .acquire_slow(attempt, None, None)
            .expect("acquire without a token cannot be interrupted");
        debug_assert!(acquired, "acquire without a deadline cannot time out");
    }

    /// Acquires in exclusive mode, blocking until admitted or until
    /// `token` is cancelled.
    pub fn acquire_exclusive_interruptibly(
        &self,
        req: P::Request,
        token: &CancelToken,
    ) -> WaitResult<()> {
        let attempt = || self.policy.try_acquire_exclusive(&self.state, req);
        self.acquire_slow(attempt, None, Some(token)).map(|acquired| {
            debug_assert!(acquired, "acquire without a deadline cannot time out");
        })
    }

    /// One exclusive attempt; never parks.
    pub fn try_acquire_exclusive(&self, req: P::Request) -> bool {
        let outcome = self.policy.try_acquire_exclusive(&self.state, req);
        if outcome == TryAcquire::Overflow {
            panic!("{}", self.policy.overflow_message());
        }
        outcome.is_acquired()
    }

    /// Exclusive acquire bounded by `timeout`. `Ok(false)` on timeout.
    pub fn try_acquire_exclusive_for(
        &self,
        req: P::Request,
        timeout: Duration,
        token: &CancelToken,
    ) -> WaitResult<bool> {
        let attempt = || self.policy.try_acquire_exclusive(&self.state, req);
        self.acquire_slow(attempt, Some(Instant::now() + timeout), Some(token))
    }

    /// Releases an exclusive hold. Returns true iff fully released
    /// (reentrancy count reached zero); wakes queued contenders.
    /// Panics if the caller does not hold the lock.
    pub fn release_exclusive(&self, req: P::Request) -> bool {
        match self.policy.try_release_exclusive(&self.state, req) {
            Ok(true) => {
                self.wake_all();
                true
            }
            Ok(false) => false,
            Err(_) => panic!("{}", NOT_HELD),
        }
    }

    // ---- queue machinery ---------------------------------------------------

    /// The acquire loop shared by every blocking variant.
    ///
    /// Returns `Ok(true)` on acquisition, `Ok(false)` on deadline
    /// expiry, `Err(Interrupted)` on cancellation. A waiter that leaves
    /// without acquiring may have absorbed a wakeup meant for another
    /// contender, so the exit paths pass one on.
    fn acquire_slow<F>(
        &self,
        attempt: F,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> WaitResult<bool>
    where
        F: Fn() -> TryAcquire,
    {
        loop {
            if let Some(token) = token {
                if token.is_cancelled() {
                    self.wake_one();
                    return Err(Interrupted);
                }
            }

            match attempt() {
                TryAcquire::Propagate => {
                    // Downstream waiters may also be admissible now.
                    self.wake_one();
                    return Ok(true);
                }
                TryAcquire::Acquired => return Ok(true),
                TryAcquire::Overflow => panic!("{}", self.policy.overflow_message()),
                TryAcquire::Blocked => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    self.wake_one();
                    return Ok(false);
                }
            }

            let registration = token.map(|t| t.register(self.park_addr()));
            let admitted = Cell::new(TryAcquire::Blocked);
            // Safety: the park key is the address of our own state word,
            // alive for the whole call; validate neither panics nor parks.
            let result = unsafe {
                park(
                    self.park_addr(),
                    || {
                        if token.is_some_and(CancelToken::is_cancelled) {
                            return false;
                        }
                        match attempt() {
                            TryAcquire::Blocked => true,
                            other => {
                                admitted.set(other);
                                false
                            }
                        }
                    },
                    || {},
                    |_, _| {},
                    ParkToken(0),
                    deadline,
                )
            };
            drop(registration);

            match result {
                ParkResult::Invalid => match admitted.get() {
                    TryAcquire::Propagate => {
                        self.wake_one();
                        return Ok(true);
                    }
                    TryAcquire::Acquired => return Ok(true),
                    TryAcquire::Overflow => panic!("{}", self.policy.overflow_message()),
                    // Aborted by cancellation; the loop re-checks the token.
                    TryAcquire::Blocked => {}
                },
                ParkResult::Unparked(_) | ParkResult::TimedOut => {}
            }
        }
    }

    #[inline]
    fn wake_one(&self) {
        // Safety: key derived from memory owned by self.
        unsafe {
            unpark_one(self.park_addr(), |_| UnparkToken(0));
        }
    }

    #[inline]
    pub(crate) fn wake_all(&self) {
        // Safety: key derived from memory owned by self.
        unsafe {
            unpark_all(self.park_addr(), UnparkToken(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::traits::NotHeld;
    use std::sync::Arc;
    use std::thread;

    /// Two-slot shared policy: at most two concurrent holders.
    struct Pair;

    impl SyncPolicy for Pair {
        type Request = u32;

        fn try_acquire_shared(&self, state: &AtomicU32, _req: u32) -> TryAcquire {
            loop {
                let s = state.load(Ordering::Relaxed);
                if s >= 2 {
                    return TryAcquire::Blocked;
                }
                if state
                    .compare_exchange(s, s + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return TryAcquire::Propagate;
                }
            }
        }

        fn try_release_shared(&self, state: &AtomicU32, _req: u32) -> Result<bool, NotHeld> {
            loop {
                let s = state.load(Ordering::Relaxed);
                if s == 0 {
                    return Err(NotHeld);
                }
                if state
                    .compare_exchange(s, s - 1, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(s == 1);
                }
            }
        }
    }

    #[test]
    fn test_shared_capacity() {
        let sync = QueueSync::new(Pair);
        assert!(sync.try_acquire_shared(0));
        assert!(sync.try_acquire_shared(0));
        assert!(!sync.try_acquire_shared(0));
        assert!(!sync.release_shared(0));
        assert!(sync.try_acquire_shared(0));
    }

    #[test]
    fn test_blocked_waiter_is_woken() {
        let sync = Arc::new(QueueSync::new(Pair));
        sync.acquire_shared(0);
        sync.acquire_shared(0);

        let sync2 = Arc::clone(&sync);
        let waiter = thread::spawn(move || {
            sync2.acquire_shared(0);
            sync2.release_shared(0);
        });

        thread::sleep(Duration::from_millis(50));
        sync.release_shared(0);
        sync.release_shared(0);
        waiter.join().unwrap();
        assert_eq!(sync.state(), 0);
    }

    #[test]
    fn test_timed_acquire_times_out() {
        let sync = QueueSync::new(Pair);
        sync.acquire_shared(0);
        sync.acquire_shared(0);

        let token = CancelToken::new();
        let start = Instant::now();
        let got = sync
            .try_acquire_shared_for(0, Duration::from_millis(50), &token)
            .unwrap();
        assert!(!got);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(sync.state(), 2);
    }

    #[test]
    fn test_cancel_interrupts_waiter() {
        let sync = Arc::new(QueueSync::new(Pair));
        sync.acquire_shared(0);
        sync.acquire_shared(0);

        let token = CancelToken::new();
        let sync2 = Arc::clone(&sync);
        let token2 = token.clone();
        let waiter = thread::spawn(move || sync2.acquire_shared_interruptibly(0, &token2));

        thread::sleep(Duration::from_millis(50));
        token.cancel();
        assert_eq!(waiter.join().unwrap(), Err(Interrupted));
        // State untouched by the interrupted waiter.
        assert_eq!(sync.state(), 2);
    }

    #[test]
    #[should_panic(expected = "not held")]
    fn test_release_unheld_panics() {
        let sync = QueueSync::new(Pair);
        sync.release_shared(0);
    }

    /// Policy whose count field is permanently saturated.
    struct Brim;

    impl SyncPolicy for Brim {
        type Request = u32;

        fn try_acquire_shared(&self, _state: &AtomicU32, _req: u32) -> TryAcquire {
            TryAcquire::Overflow
        }
    }

    #[test]
    #[should_panic(expected = "maximum lock count exceeded")]
    fn test_overflow_outcome_is_fatal() {
        let sync = QueueSync::new(Brim);
        sync.try_acquire_shared(0);
    }
}
