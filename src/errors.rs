/*!
 * Error Types
 *
 * Fallible outcomes surfaced through `Result`, plus the stable panic
 * messages for the two non-recoverable misuse classes.
 *
 * Misuse (releasing a lock the caller does not hold, or saturating a
 * count field) is a programming error and panics; cancellation of a
 * blocking acquire is an ordinary runtime outcome and is returned as
 * `Err(Interrupted)`. Timeouts are not errors: timed operations return
 * `Ok(false)`.
 */

use thiserror::Error;

/// A blocking acquisition was cancelled through its [`CancelToken`].
///
/// The waiter has left the queue, the synchronizer state is unchanged,
/// and any wakeup the waiter may have absorbed has been passed on.
///
/// [`CancelToken`]: crate::sync::CancelToken
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("lock acquisition interrupted")]
pub struct Interrupted;

/// Panic message for a release that does not correspond to a prior
/// acquisition by the caller in the requested mode.
pub(crate) const NOT_HELD: &str = "lock is not held by the caller in the requested mode";

/// Panic message for a saturated reentrancy or shared-holder count.
pub(crate) const MAX_LOCKS_EXCEEDED: &str = "maximum lock count exceeded";

/// Panic message for a room hold count that would carry into the index bits.
pub(crate) const MAX_HOLDS_EXCEEDED: &str = "maximum hold count exceeded";
