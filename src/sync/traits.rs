/*!
 * Synchronizer Policy Trait
 *
 * The seam between the queueing substrate and the primitives built on
 * it. A policy supplies the compare-and-swap transition predicates; the
 * substrate supplies blocking, timeouts, cancellation, and wakeups.
 *
 * # Design: Generic Request Over Thread-Local Side Channels
 *
 * The request argument is an associated type rather than a fixed
 * integer. Most policies use a `u32` request that is itself a valid
 * state word, but a policy that needs to know *who* is asking (an
 * owner-keyed lock) carries that identity inside the request instead of
 * smuggling it through a thread-local.
 */

use crate::errors::Interrupted;
use std::sync::atomic::AtomicU32;

/// Outcome of a single acquire attempt.
///
/// `Overflow` is reported rather than raised so that attempts made
/// under the wait-queue bucket lock stay panic-free; the substrate
/// panics on the caller's stack once the bucket is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAcquire {
    /// Transition installed; waiters behind this one may now also succeed.
    Propagate,
    /// Transition installed; no further wakeups are needed.
    Acquired,
    /// Incompatible holders are present; the caller must wait.
    Blocked,
    /// A count field is saturated. Fatal; state is unchanged.
    Overflow,
}

impl TryAcquire {
    /// Whether the attempt installed the transition.
    #[inline(always)]
    pub fn is_acquired(self) -> bool {
        matches!(self, TryAcquire::Propagate | TryAcquire::Acquired)
    }
}

/// Error carried by a release predicate whose caller does not hold the
/// lock in the mode it is releasing. The substrate converts this into a
/// panic at the public API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotHeld;

/// Transition predicates for a [`QueueSync`].
///
/// Implementations must be thread-safe and must mutate the state word
/// only through compare-and-swap on an observed previous value. A
/// policy supports the shared path, the exclusive path, or both; the
/// unimplemented path keeps its default, which panics if reached.
///
/// [`QueueSync`]: crate::sync::QueueSync
pub trait SyncPolicy: Send + Sync {
    /// Opaque request argument threaded through acquire and release.
    type Request: Copy + Send;

    /// Attempt a shared transition without blocking.
    fn try_acquire_shared(&self, state: &AtomicU32, req: Self::Request) -> TryAcquire {
        let _ = (state, req);
        unimplemented!("shared path not supported by this synchronizer")
    }

    /// Attempt a shared release. `Ok(true)` iff the state returned to
    /// fully free, which triggers waking of queued contenders.
    fn try_release_shared(&self, state: &AtomicU32, req: Self::Request) -> Result<bool, NotHeld> {
        let _ = (state, req);
        unimplemented!("shared path not supported by this synchronizer")
    }

    /// Attempt an exclusive transition without blocking.
    fn try_acquire_exclusive(&self, state: &AtomicU32, req: Self::Request) -> TryAcquire {
        let _ = (state, req);
        unimplemented!("exclusive path not supported by this synchronizer")
    }

    /// Attempt an exclusive release. `Ok(true)` iff fully released.
    fn try_release_exclusive(&self, state: &AtomicU32, req: Self::Request) -> Result<bool, NotHeld> {
        let _ = (state, req);
        unimplemented!("exclusive path not supported by this synchronizer")
    }

    /// Whether the principal identified by `req` holds the exclusive
    /// path. Condition waits check this before releasing.
    fn held_exclusively(&self, state: &AtomicU32, req: Self::Request) -> bool {
        let _ = (state, req);
        false
    }

    /// Panic message raised when an attempt reports [`TryAcquire::Overflow`].
    fn overflow_message(&self) -> &'static str {
        crate::errors::MAX_LOCKS_EXCEEDED
    }
}

/// Convenience alias for interruptible results.
pub type WaitResult<T> = Result<T, Interrupted>;
