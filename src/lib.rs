/*!
 * multilock
 *
 * Advanced synchronization primitives over one queue-based
 * synchronizer: a single 32-bit atomic state word manipulated only by
 * compare-and-swap, with parking-lot queueing for contenders.
 *
 * # Primitives
 *
 * - [`MultiModeLock`]: four modes (read, write, intent-read,
 *   intent-write) with a compatibility matrix; reentrant write mode
 *   with condition support.
 * - [`RoomSynchronizer`]: named rooms, each a reentrant shared lock,
 *   with mutual exclusion across rooms.
 * - [`GenderLock`]: rooms with exit handlers fired when a room
 *   empties.
 * - [`DynamicRooms`]: rooms minted lazily on first request, with
 *   selectable strategies for index-width changes.
 * - [`OwnedLock`]: reentrant exclusive locking keyed on an
 *   application-supplied owner object.
 *
 * All primitives are non-fair and permit barging. Blocking operations
 * come in plain, interruptible ([`CancelToken`]), and timed variants;
 * see the [`Lock`] trait for the common surface.
 */

pub mod errors;
pub mod lock;
pub mod modal;
pub mod owned;
pub mod rooms;
pub mod sync;

pub use errors::Interrupted;
pub use lock::Lock;
pub use modal::{ModeLock, MultiModeLock};
pub use owned::{OwnedHandle, OwnedLock};
pub use rooms::{DynamicRooms, GenderLock, RoomLock, RoomSynchronizer, Strategy};
pub use sync::{CancelToken, Condition, QueueSync, SyncPolicy, TryAcquire};
