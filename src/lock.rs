/*!
 * Common Lock Interface
 *
 * The operation set shared by every lock handle in this crate. A
 * handle is a cheap value naming one facet of a synchronizer (a mode,
 * a room, an owner); the same facet may be named by any number of
 * handles, and holds taken through one may be released through
 * another.
 *
 * Handles that support condition queues expose `new_condition` as an
 * inherent method; shared-mode handles have no condition support.
 */

use crate::errors::Interrupted;
use crate::sync::CancelToken;
use std::time::Duration;

/// Blocking lock operations common to all handles.
///
/// | Op | Suspends | Interruptible | Timeout | Failure |
/// |---|---|---|---|---|
/// | `lock` | yes | no | no | panics on count overflow |
/// | `lock_interruptibly` | yes | yes | no | `Err(Interrupted)` |
/// | `try_lock` | no | no | no | returns `false` |
/// | `try_lock_for` | bounded | yes | yes | `Ok(false)` / `Err(Interrupted)` |
/// | `unlock` | no | no | no | panics if not held |
pub trait Lock {
    /// Acquires, blocking the calling thread until the hold is granted.
    fn lock(&self);

    /// Acquires, blocking until granted or until `token` is cancelled.
    /// On cancellation the waiter leaves the queue with the
    /// synchronizer state unchanged.
    fn lock_interruptibly(&self, token: &CancelToken) -> Result<(), Interrupted>;

    /// A single acquisition attempt. Never blocks.
    fn try_lock(&self) -> bool;

    /// Acquires, blocking for at most `timeout`. Returns `Ok(false)`
    /// on timeout; timeouts are not errors.
    fn try_lock_for(&self, timeout: Duration, token: &CancelToken) -> Result<bool, Interrupted>;

    /// Releases one hold. Panics if the calling principal does not
    /// hold the lock in this handle's mode.
    fn unlock(&self);
}
