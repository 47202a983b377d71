/*!
 * Room Synchronizer
 *
 * A fixed set of named rooms, each a reentrant shared lock. Any
 * number of holders may occupy one room; no two rooms are ever
 * occupied at the same time. Room keys are assigned origin-1 indices
 * in iteration order at construction, and the index mask is fixed to
 * the minimum width for the largest index.
 */

use super::handle::RoomLock;
use super::state::{self, Saturated};
use crate::errors::MAX_HOLDS_EXCEEDED;
use crate::sync::{NotHeld, QueueSync, SyncPolicy, TryAcquire};
use ahash::RandomState;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

/// Transition predicates for a fixed room set: a constant index mask.
pub struct RoomPolicy {
    mask: u32,
}

impl SyncPolicy for RoomPolicy {
    type Request = u32;

    fn try_acquire_shared(&self, state: &AtomicU32, index: u32) -> TryAcquire {
        loop {
            let s = state.load(Ordering::Relaxed);
            if !state::can_acquire(index, s, self.mask) {
                return TryAcquire::Blocked;
            }
            let ns = match state::acquired(index, s, self.mask) {
                Ok(ns) => ns,
                Err(Saturated) => return TryAcquire::Overflow,
            };
            if state
                .compare_exchange(s, ns, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return TryAcquire::Propagate;
            }
        }
    }

    fn try_release_shared(&self, state: &AtomicU32, index: u32) -> Result<bool, NotHeld> {
        loop {
            let s = state.load(Ordering::Relaxed);
            let ns = state::released(index, s, self.mask)?;
            if state
                .compare_exchange(s, ns, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(ns == 0);
            }
        }
    }

    fn overflow_message(&self) -> &'static str {
        MAX_HOLDS_EXCEEDED
    }
}

/// Mutual exclusion between rooms, shared access within one.
///
/// Acquisition is non-fair and conditions are unsupported. Holds are
/// counted, not thread-reentrant: a thread taking the same room twice
/// must release twice.
pub struct RoomSynchronizer<R> {
    sync: QueueSync<RoomPolicy>,
    rooms: HashMap<R, u32, RandomState>,
}

impl<R: Eq + Hash> RoomSynchronizer<R> {
    /// Creates a synchronizer over the given rooms, indexed in
    /// iteration order.
    pub fn new(rooms: impl IntoIterator<Item = R>) -> Self {
        let mut map = HashMap::with_hasher(RandomState::new());
        let mut next = 1u32;
        for room in rooms {
            map.insert(room, state::encode_index(next));
            next += 1;
        }
        Self {
            sync: QueueSync::new(RoomPolicy {
                mask: state::index_mask(next - 1),
            }),
            rooms: map,
        }
    }

    /// The lock handle for `room`. Panics if the room was not part of
    /// the construction set.
    pub fn lock_for(&self, room: &R) -> RoomLock<'_, RoomPolicy> {
        let &index = self.rooms.get(room).expect("unknown room");
        RoomLock::new(&self.sync, index)
    }

    /// Whether no room is occupied.
    pub fn is_free(&self) -> bool {
        self.sync.state() == 0
    }

    /// Outstanding holds on the occupied room (0 when free).
    pub fn hold_count(&self) -> u32 {
        let s = self.sync.state();
        state::extract_count(s, self.sync.policy().mask)
    }

    pub(crate) fn index_of(&self, room: &R) -> u32 {
        *self.rooms.get(room).expect("unknown room")
    }
}
