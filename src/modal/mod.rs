/*!
 * Multi-Mode Lock
 *
 * A lock with four modes (read, write, intent-read, intent-write)
 * over one mode-tagged state word. Intent modes let callers announce
 * upcoming read or write activity without taking the full mode; the
 * compatibility matrix on [`MultiModeLock`] governs coexistence.
 */

mod lock;
mod state;

pub use lock::{ModalPolicy, ModeLock, MultiModeLock};
