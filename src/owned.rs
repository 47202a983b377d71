/*!
 * Owner-Keyed Lock
 *
 * A reentrant exclusive lock whose notion of "owner" is an
 * application-supplied object rather than the calling thread: any
 * thread may take further holds or release, as long as it presents
 * the owning object. The owner travels inside the request the policy
 * receives, so identity never rides a thread-local side channel.
 *
 * Owner identity is the address of the owner's `Arc` allocation;
 * handles keep the `Arc` alive, so an address can never be recycled
 * while a handle that uses it exists.
 */

use crate::errors::Interrupted;
use crate::lock::Lock;
use crate::sync::{CancelToken, Condition, NotHeld, QueueSync, SyncPolicy, TryAcquire};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Request for the owner-keyed policy: who is asking, and how many
/// holds to move.
///
/// Opaque; public only because it is the policy's request type.
#[derive(Debug, Clone, Copy)]
pub struct OwnedRequest {
    owner: usize,
    holds: u32,
}

/// Transition predicates for the owner-keyed lock. The state word is
/// the reentrancy depth; owner identity lives beside it.
pub struct OwnedPolicy {
    /// Address identifying the current owner. Written only around the
    /// 0↔held transitions, read by principals that already observed a
    /// nonzero depth, so relaxed ordering suffices.
    owner: AtomicUsize,
}

impl SyncPolicy for OwnedPolicy {
    type Request = OwnedRequest;

    fn try_acquire_exclusive(&self, state: &AtomicU32, req: OwnedRequest) -> TryAcquire {
        if state
            .compare_exchange(0, req.holds, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(req.owner, Ordering::Relaxed);
            return TryAcquire::Acquired;
        }
        if !self.held_exclusively(state, req) {
            return TryAcquire::Blocked;
        }
        let s = state.load(Ordering::Relaxed);
        match s.checked_add(req.holds) {
            Some(ns) => {
                state.store(ns, Ordering::Relaxed);
                TryAcquire::Acquired
            }
            None => TryAcquire::Overflow,
        }
    }

    fn try_release_exclusive(&self, state: &AtomicU32, req: OwnedRequest) -> Result<bool, NotHeld> {
        if !self.held_exclusively(state, req) {
            return Err(NotHeld);
        }
        let s = state.load(Ordering::Relaxed);
        if s == req.holds {
            self.owner.store(0, Ordering::Relaxed);
            state.store(0, Ordering::Release);
            Ok(true)
        } else {
            state.store(s - req.holds, Ordering::Release);
            Ok(false)
        }
    }

    fn held_exclusively(&self, state: &AtomicU32, req: OwnedRequest) -> bool {
        state.load(Ordering::Relaxed) > 0 && self.owner.load(Ordering::Relaxed) == req.owner
    }
}

/// Exclusive, reentrant locking keyed on owner objects of type `T`.
///
/// `lock_for` returns a handle bound to an owner; handles with the
/// same owner are interchangeable. Reentrancy follows the owner, not
/// the thread: the same thread presenting a different owner must wait.
pub struct OwnedLock<T> {
    sync: QueueSync<OwnedPolicy>,
    _owners: PhantomData<fn(Arc<T>)>,
}

impl<T> OwnedLock<T> {
    /// Creates the lock in the free state.
    pub fn new() -> Self {
        Self {
            sync: QueueSync::new(OwnedPolicy {
                owner: AtomicUsize::new(0),
            }),
            _owners: PhantomData,
        }
    }

    /// A handle bound to `owner`. The handle keeps a reference to the
    /// owner for identity.
    pub fn lock_for(&self, owner: &Arc<T>) -> OwnedHandle<'_, T> {
        OwnedHandle {
            sync: &self.sync,
            owner: Arc::clone(owner),
        }
    }

    /// Current reentrancy depth (0 when free).
    pub fn hold_count(&self) -> u32 {
        self.sync.state()
    }

    /// Whether no owner holds the lock.
    pub fn is_free(&self) -> bool {
        self.sync.state() == 0
    }
}

impl<T> Default for OwnedLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on an [`OwnedLock`] bound to one owner object.
pub struct OwnedHandle<'a, T> {
    sync: &'a QueueSync<OwnedPolicy>,
    owner: Arc<T>,
}

impl<T> Clone for OwnedHandle<'_, T> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync,
            owner: Arc::clone(&self.owner),
        }
    }
}

impl<'a, T> OwnedHandle<'a, T> {
    #[inline]
    fn request(&self, holds: u32) -> OwnedRequest {
        OwnedRequest {
            owner: Arc::as_ptr(&self.owner) as usize,
            holds,
        }
    }

    /// Whether this handle's owner currently holds the lock.
    pub fn holds_lock(&self) -> bool {
        self.sync
            .policy()
            .held_exclusively(self.sync.state_atomic(), self.request(0))
    }

    /// A condition queue bound to this handle's owner.
    pub fn new_condition(&self) -> Condition<'a, OwnedPolicy>
    where
        T: Send + Sync + 'static,
    {
        let owner = Arc::clone(&self.owner);
        Condition::new(
            self.sync,
            Box::new(move |saved| OwnedRequest {
                owner: Arc::as_ptr(&owner) as usize,
                holds: saved,
            }),
        )
    }
}

impl<T> Lock for OwnedHandle<'_, T> {
    fn lock(&self) {
        self.sync.acquire_exclusive(self.request(1));
    }

    fn lock_interruptibly(&self, token: &CancelToken) -> Result<(), Interrupted> {
        self.sync
            .acquire_exclusive_interruptibly(self.request(1), token)
    }

    fn try_lock(&self) -> bool {
        self.sync.try_acquire_exclusive(self.request(1))
    }

    fn try_lock_for(&self, timeout: Duration, token: &CancelToken) -> Result<bool, Interrupted> {
        self.sync
            .try_acquire_exclusive_for(self.request(1), timeout, token)
    }

    fn unlock(&self) {
        self.sync.release_exclusive(self.request(1));
    }
}
