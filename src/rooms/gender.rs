/*!
 * Gender Lock
 *
 * Room synchronization plus exit notification: each room may carry a
 * handler that runs when the room's last hold is released. The
 * handler runs on the releasing thread, after the compare-and-swap
 * that cleared the state, and its panics propagate to the `unlock`
 * caller.
 */

use super::handle::RoomLock;
use super::rooms::{RoomPolicy, RoomSynchronizer};
use crate::errors::Interrupted;
use crate::lock::Lock;
use crate::sync::CancelToken;
use ahash::RandomState;
use dashmap::DashMap;
use log::debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

type ExitHandler = Arc<dyn Fn() + Send + Sync>;

/// A room synchronizer whose rooms announce when they empty.
pub struct GenderLock<G> {
    rooms: RoomSynchronizer<G>,
    handlers: DashMap<u32, ExitHandler, RandomState>,
}

impl<G: Eq + Hash> GenderLock<G> {
    /// Creates a gender lock over the given genders, indexed in
    /// iteration order.
    pub fn new(genders: impl IntoIterator<Item = G>) -> Self {
        Self {
            rooms: RoomSynchronizer::new(genders),
            handlers: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// The lock handle for `gender`. Panics on an unknown key.
    pub fn lock_for(&self, gender: &G) -> GenderRoomLock<'_> {
        GenderRoomLock {
            inner: self.rooms.lock_for(gender),
            handlers: &self.handlers,
        }
    }

    /// Installs `handler` to run each time `gender`'s room empties.
    /// Replaces any previously installed handler for that room.
    pub fn set_exit_handler(&self, gender: &G, handler: impl Fn() + Send + Sync + 'static) {
        let index = self.rooms.index_of(gender);
        debug!("exit handler installed for room index {index:#x}");
        self.handlers.insert(index, Arc::new(handler));
    }

    /// Whether no room is occupied.
    pub fn is_free(&self) -> bool {
        self.rooms.is_free()
    }

    /// Outstanding holds on the occupied room (0 when free).
    pub fn hold_count(&self) -> u32 {
        self.rooms.hold_count()
    }
}

/// Handle on one gender's room; runs the room's exit handler when a
/// release empties the room.
#[derive(Clone, Copy)]
pub struct GenderRoomLock<'a> {
    inner: RoomLock<'a, RoomPolicy>,
    handlers: &'a DashMap<u32, ExitHandler, RandomState>,
}

impl Lock for GenderRoomLock<'_> {
    fn lock(&self) {
        self.inner.lock();
    }

    fn lock_interruptibly(&self, token: &CancelToken) -> Result<(), Interrupted> {
        self.inner.lock_interruptibly(token)
    }

    fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    fn try_lock_for(&self, timeout: Duration, token: &CancelToken) -> Result<bool, Interrupted> {
        self.inner.try_lock_for(timeout, token)
    }

    fn unlock(&self) {
        if self.inner.release() {
            // Clone out of the map so the handler runs without any
            // shard lock held and may re-register handlers itself.
            let handler = self
                .handlers
                .get(&self.inner.index())
                .map(|h| Arc::clone(h.value()));
            if let Some(handler) = handler {
                handler();
            }
        }
    }
}
