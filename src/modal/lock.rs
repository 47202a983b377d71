/*!
 * Four-Mode Lock
 *
 * One synchronizer, four handles: read, write, intent-read, and
 * intent-write. Shared modes coexist per the compatibility rules in
 * [`state`](super::state); the write mode is exclusive and reentrant
 * and is the only mode with condition support.
 *
 * # Design: One Handle Struct Over Four Handle Types
 *
 * The handles differ only in their fixed request word and in whether
 * they drive the shared or the exclusive substrate path, so they are
 * four values of one small struct with enum dispatch, not four types.
 */

use super::state::{self, Saturated};
use crate::errors::Interrupted;
use crate::lock::Lock;
use crate::sync::thread::current_thread_id;
use crate::sync::{CancelToken, Condition, NotHeld, QueueSync, SyncPolicy, TryAcquire};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Transition predicates for the four-mode state word.
///
/// Opaque; public only because it names the policy parameter of the
/// write handle's [`Condition`].
pub struct ModalPolicy {
    /// Identity of the exclusive holder. Written only by the thread
    /// that installed the exclusive transition, read by threads that
    /// have already observed an exclusive state word, so relaxed
    /// ordering suffices.
    owner: AtomicUsize,
}

impl SyncPolicy for ModalPolicy {
    type Request = u32;

    fn try_acquire_shared(&self, state: &AtomicU32, req: u32) -> TryAcquire {
        loop {
            let s = state.load(Ordering::Relaxed);
            let r = state::effective_request(s, req);
            if !state::can_acquire_shared(s, r) {
                return TryAcquire::Blocked;
            }
            let ns = match state::acquired_shared(s, r) {
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

    fn try_release_shared(&self, state: &AtomicU32, req: u32) -> Result<bool, NotHeld> {
        loop {
            let s = state.load(Ordering::Relaxed);
            let r = state::effective_request(s, req);
            state::can_release_shared(s, r)?;
            let ns = state::released_shared(s, r)?;
            if state
                .compare_exchange(s, ns, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(ns == state::FREE);
            }
        }
    }

    fn try_acquire_exclusive(&self, state: &AtomicU32, req: u32) -> TryAcquire {
        if state
            .compare_exchange(state::FREE, req, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(current_thread_id(), Ordering::Relaxed);
            return TryAcquire::Acquired;
        }
        if !self.held_exclusively(state, req) {
            return TryAcquire::Blocked;
        }
        // Reentrant bump: only the holder writes while the tag is
        // exclusive, so a plain store cannot race another transition.
        let s = state.load(Ordering::Relaxed);
        match state::acquired_exclusive(s, req) {
            Ok(ns) => {
                state.store(ns, Ordering::Relaxed);
                TryAcquire::Acquired
            }
            Err(Saturated) => TryAcquire::Overflow,
        }
    }

    fn try_release_exclusive(&self, state: &AtomicU32, req: u32) -> Result<bool, NotHeld> {
        if !self.held_exclusively(state, req) {
            return Err(NotHeld);
        }
        let s = state.load(Ordering::Relaxed);
        if s == req {
            self.owner.store(0, Ordering::Relaxed);
            state.store(state::FREE, Ordering::Release);
            Ok(true)
        } else {
            state.store(s - state::exclusive_count(req), Ordering::Release);
            Ok(false)
        }
    }

    fn held_exclusively(&self, state: &AtomicU32, _req: u32) -> bool {
        state::is_exclusive(state.load(Ordering::Relaxed))
            && self.owner.load(Ordering::Relaxed) == current_thread_id()
    }
}

/// Which substrate path a handle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Shared,
    Exclusive,
}

/// A handle on one mode of a [`MultiModeLock`].
///
/// Handles are `Copy`; any handle for a mode releases holds taken
/// through any other handle for the same mode.
#[derive(Clone, Copy)]
pub struct ModeLock<'a> {
    sync: &'a QueueSync<ModalPolicy>,
    request: u32,
    path: Path,
}

impl<'a> ModeLock<'a> {
    /// Condition queue for this handle. Only the write mode supports
    /// conditions; shared handles return `None`.
    pub fn new_condition(&self) -> Option<Condition<'a, ModalPolicy>> {
        match self.path {
            Path::Exclusive => Some(Condition::new(self.sync, Box::new(|s| s))),
            Path::Shared => None,
        }
    }
}

impl Lock for ModeLock<'_> {
    fn lock(&self) {
        match self.path {
            Path::Shared => self.sync.acquire_shared(self.request),
            Path::Exclusive => self.sync.acquire_exclusive(self.request),
        }
    }

    fn lock_interruptibly(&self, token: &CancelToken) -> Result<(), Interrupted> {
        match self.path {
            Path::Shared => self.sync.acquire_shared_interruptibly(self.request, token),
            Path::Exclusive => self.sync.acquire_exclusive_interruptibly(self.request, token),
        }
    }

    fn try_lock(&self) -> bool {
        match self.path {
            Path::Shared => self.sync.try_acquire_shared(self.request),
            Path::Exclusive => self.sync.try_acquire_exclusive(self.request),
        }
    }

    fn try_lock_for(&self, timeout: Duration, token: &CancelToken) -> Result<bool, Interrupted> {
        match self.path {
            Path::Shared => self.sync.try_acquire_shared_for(self.request, timeout, token),
            Path::Exclusive => self.sync.try_acquire_exclusive_for(self.request, timeout, token),
        }
    }

    fn unlock(&self) {
        match self.path {
            Path::Shared => {
                self.sync.release_shared(self.request);
            }
            Path::Exclusive => {
                self.sync.release_exclusive(self.request);
            }
        }
    }
}

/// A lock with four modes: read, write, intent-read, and intent-write.
///
/// The compatibility matrix (Y = may coexist):
///
/// |    | IR | R | IW | W |
/// |----|----|---|----|---|
/// | IR | Y  | Y | Y  |   |
/// | R  | Y  | Y |    |   |
/// | IW | Y  |   | Y  |   |
/// | W  |    |   |    |   |
///
/// Acquisition is non-fair and the write mode is reentrant. Shared
/// modes are counted rather than reentrant: a thread acquiring a
/// shared mode twice consumes two holds and must release twice.
pub struct MultiModeLock {
    sync: QueueSync<ModalPolicy>,
}

impl MultiModeLock {
    /// Creates the lock in the free state.
    pub fn new() -> Self {
        Self {
            sync: QueueSync::new(ModalPolicy {
                owner: AtomicUsize::new(0),
            }),
        }
    }

    fn handle(&self, request: u32, path: Path) -> ModeLock<'_> {
        ModeLock {
            sync: &self.sync,
            request,
            path,
        }
    }

    /// Handle for the read mode.
    pub fn read_lock(&self) -> ModeLock<'_> {
        self.handle(state::READ_REQ, Path::Shared)
    }

    /// Handle for the write mode. Reentrant; supports conditions.
    pub fn write_lock(&self) -> ModeLock<'_> {
        self.handle(state::WRITE_REQ, Path::Exclusive)
    }

    /// Handle for the intent-read mode.
    pub fn intent_read_lock(&self) -> ModeLock<'_> {
        self.handle(state::IR_REQ, Path::Shared)
    }

    /// Handle for the intent-write mode.
    pub fn intent_write_lock(&self) -> ModeLock<'_> {
        self.handle(state::IW_REQ, Path::Shared)
    }

    /// Alias for [`intent_write_lock`](Self::intent_write_lock), for
    /// callers that use the mode to guard counter increments.
    pub fn increment_lock(&self) -> ModeLock<'_> {
        self.intent_write_lock()
    }

    /// Whether no mode is currently held.
    pub fn is_free(&self) -> bool {
        self.sync.state() == state::FREE
    }

    /// Reentrant write holds, or 0 when not write-locked.
    pub fn write_holds(&self) -> u32 {
        let s = self.sync.state();
        if state::is_exclusive(s) {
            state::exclusive_count(s)
        } else {
            0
        }
    }

    /// Outstanding read holds.
    pub fn reader_holds(&self) -> u32 {
        let s = self.sync.state();
        if state::mode(s) == state::READERS {
            state::lower_count(s)
        } else {
            0
        }
    }

    /// Outstanding intent-write holds.
    pub fn intent_write_holds(&self) -> u32 {
        let s = self.sync.state();
        if state::mode(s) == state::INTENT_WRITERS {
            state::lower_count(s)
        } else {
            0
        }
    }

    /// Outstanding intent-read holds (counted under either shared tag).
    pub fn intent_read_holds(&self) -> u32 {
        let s = self.sync.state();
        match state::mode(s) {
            state::READERS | state::INTENT_WRITERS => state::upper_count(s),
            _ => 0,
        }
    }
}

impl Default for MultiModeLock {
    fn default() -> Self {
        Self::new()
    }
}
