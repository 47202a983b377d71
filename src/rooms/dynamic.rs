/*!
 * Dynamic Rooms
 *
 * Room synchronization over a room set discovered at run time: the
 * first request for a key mints the next origin-1 index, which may
 * widen the index mask across a power-of-two boundary. Because the
 * index region grows flush-left over bit-reversed indices, widening
 * is a pure extension and already-encoded states stay valid.
 *
 * # Acquisition strategies
 *
 * A concurrent registration can widen the mask between the mask read
 * and the installing compare-and-swap. Three strategies handle this
 * race, selected at construction:
 *
 * - [`Strategy::Conservative`]: two mask reads per acquisition (read
 *   once, install, re-read); if the mask widened meanwhile, back the
 *   install out and retry under the new mask.
 * - [`Strategy::Reloading`]: reload the mask on every loop iteration
 *   and skip the post-install check. Cheaper when registrations are
 *   rare, more volatile reads under contention.
 * - [`Strategy::OneShot`]: a single attempt with the current mask;
 *   a failed compare-and-swap reports blocked instead of spinning.
 *   For callers that manage retries themselves.
 */

use super::handle::RoomLock;
use super::state::{self, Saturated};
use crate::errors::MAX_HOLDS_EXCEEDED;
use crate::sync::{NotHeld, QueueSync, SyncPolicy, TryAcquire};
use ahash::RandomState;
use dashmap::DashMap;
use log::debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

/// How an acquisition copes with a concurrently widening index mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Two mask reads; back out and retry if the mask widened across
    /// the install.
    #[default]
    Conservative,
    /// Reload the mask on every retry iteration.
    Reloading,
    /// One attempt with the current mask; never spins.
    OneShot,
}

/// Transition predicates over a live room count.
pub struct DynRoomPolicy {
    /// Next index to mint; `ngenders - 1` is the largest index handed
    /// out so far. Sequentially consistent so mask reads cannot pass
    /// the registration that widened them.
    ngenders: AtomicU32,
    strategy: Strategy,
}

impl DynRoomPolicy {
    fn mask(&self) -> u32 {
        state::index_mask(self.ngenders.load(Ordering::SeqCst) - 1)
    }

    fn acquire_conservative(&self, atom: &AtomicU32, index: u32) -> TryAcquire {
        let mut mask = self.mask();
        loop {
            let s = atom.load(Ordering::Relaxed);
            if !state::can_acquire(index, s, mask) {
                return TryAcquire::Blocked;
            }
            let ns = match state::acquired(index, s, mask) {
                Ok(ns) => ns,
                Err(Saturated) => return TryAcquire::Overflow,
            };
            if atom
                .compare_exchange(s, ns, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let reread = self.mask();
                if reread == mask {
                    return TryAcquire::Propagate;
                }
                // A registration widened the mask across the install;
                // the index-match test above may have been too narrow.
                // Undo this hold and retry under the new mask.
                mask = reread;
                loop {
                    let s = atom.load(Ordering::Relaxed);
                    let ns = if state::extract_count(s - 1, mask) == 0 {
                        0
                    } else {
                        s - 1
                    };
                    if atom
                        .compare_exchange(s, ns, Ordering::Release, Ordering::Relaxed)
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }
    }

    fn acquire_reloading(&self, atom: &AtomicU32, index: u32) -> TryAcquire {
        loop {
            let mask = self.mask();
            let s = atom.load(Ordering::Relaxed);
            if !state::can_acquire(index, s, mask) {
                return TryAcquire::Blocked;
            }
            let ns = match state::acquired(index, s, mask) {
                Ok(ns) => ns,
                Err(Saturated) => return TryAcquire::Overflow,
            };
            if atom
                .compare_exchange(s, ns, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return TryAcquire::Propagate;
            }
        }
    }

    fn acquire_one_shot(&self, atom: &AtomicU32, index: u32) -> TryAcquire {
        let mask = self.mask();
        let s = atom.load(Ordering::Relaxed);
        if !state::can_acquire(index, s, mask) {
            return TryAcquire::Blocked;
        }
        let ns = match state::acquired(index, s, mask) {
            Ok(ns) => ns,
            Err(Saturated) => return TryAcquire::Overflow,
        };
        if atom
            .compare_exchange(s, ns, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            TryAcquire::Propagate
        } else {
            TryAcquire::Blocked
        }
    }
}

impl SyncPolicy for DynRoomPolicy {
    type Request = u32;

    fn try_acquire_shared(&self, atom: &AtomicU32, index: u32) -> TryAcquire {
        match self.strategy {
            Strategy::Conservative => self.acquire_conservative(atom, index),
            Strategy::Reloading => self.acquire_reloading(atom, index),
            Strategy::OneShot => self.acquire_one_shot(atom, index),
        }
    }

    fn try_release_shared(&self, atom: &AtomicU32, index: u32) -> Result<bool, NotHeld> {
        let mask = self.mask();
        loop {
            let s = atom.load(Ordering::Relaxed);
            let ns = state::released(index, s, mask)?;
            if atom
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

/// Room synchronization with rooms minted on first request.
///
/// Even under concurrent registration no two distinct rooms are ever
/// occupied simultaneously; see [`Strategy`] for how the widening
/// race is resolved.
pub struct DynamicRooms<G> {
    sync: QueueSync<DynRoomPolicy>,
    indices: DashMap<G, u32, RandomState>,
}

impl<G: Eq + Hash> DynamicRooms<G> {
    /// Creates an empty room set using [`Strategy::Conservative`].
    pub fn new() -> Self {
        Self::with_strategy(Strategy::default())
    }

    /// Creates an empty room set with the given strategy.
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            sync: QueueSync::new(DynRoomPolicy {
                ngenders: AtomicU32::new(1),
                strategy,
            }),
            indices: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// The lock handle for `key`, minting a fresh room index on the
    /// key's first appearance.
    pub fn lock_for(&self, key: G) -> RoomLock<'_, DynRoomPolicy> {
        let index = *self.indices.entry(key).or_insert_with(|| {
            let minted = self
                .sync
                .policy()
                .ngenders
                .fetch_add(1, Ordering::SeqCst);
            debug!("minted dynamic room index {minted}");
            state::encode_index(minted)
        });
        RoomLock::new(&self.sync, index)
    }

    /// Number of rooms minted so far.
    pub fn room_count(&self) -> u32 {
        self.sync.policy().ngenders.load(Ordering::SeqCst) - 1
    }

    /// Whether no room is occupied.
    pub fn is_free(&self) -> bool {
        self.sync.state() == 0
    }
}

impl<G: Eq + Hash> Default for DynamicRooms<G> {
    fn default() -> Self {
        Self::new()
    }
}
