/*!
 * Room Lock Handle
 *
 * One handle type serves every room-style synchronizer: a handle is
 * the pair (synchronizer, encoded room index), and all of its
 * operations ride the shared substrate path with the index as the
 * request.
 */

use crate::errors::Interrupted;
use crate::lock::Lock;
use crate::sync::{CancelToken, QueueSync, SyncPolicy};
use std::time::Duration;

/// Reentrant shared lock on one room.
///
/// Any number of holds may be taken on the same room concurrently;
/// holds on different rooms of the same synchronizer exclude each
/// other. Room handles have no condition support.
pub struct RoomLock<'a, P: SyncPolicy<Request = u32>> {
    sync: &'a QueueSync<P>,
    index: u32,
}

impl<'a, P: SyncPolicy<Request = u32>> RoomLock<'a, P> {
    pub(crate) fn new(sync: &'a QueueSync<P>, index: u32) -> Self {
        Self { sync, index }
    }

    /// The room's encoded (bit-reversed) index.
    #[inline]
    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    /// Releases one hold, reporting whether the room emptied.
    pub(crate) fn release(&self) -> bool {
        self.sync.release_shared(self.index)
    }
}

impl<P: SyncPolicy<Request = u32>> Clone for RoomLock<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: SyncPolicy<Request = u32>> Copy for RoomLock<'_, P> {}

impl<P: SyncPolicy<Request = u32>> Lock for RoomLock<'_, P> {
    fn lock(&self) {
        self.sync.acquire_shared(self.index);
    }

    fn lock_interruptibly(&self, token: &CancelToken) -> Result<(), Interrupted> {
        self.sync.acquire_shared_interruptibly(self.index, token)
    }

    fn try_lock(&self) -> bool {
        self.sync.try_acquire_shared(self.index)
    }

    fn try_lock_for(&self, timeout: Duration, token: &CancelToken) -> Result<bool, Interrupted> {
        self.sync.try_acquire_shared_for(self.index, timeout, token)
    }

    fn unlock(&self) {
        self.release();
    }
}
