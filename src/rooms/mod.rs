/*!
 * Room Synchronization
 *
 * A room is a named shared sub-lock; at most one room of a
 * synchronizer may be occupied at a time, by any number of holders.
 * Three variants share one state encoding and one handle type:
 *
 * - [`RoomSynchronizer`]: fixed room set, mask fixed at construction.
 * - [`GenderLock`]: rooms with exit handlers fired on emptying.
 * - [`DynamicRooms`]: rooms minted on first request, with selectable
 *   strategies for the mask-widening race.
 */

mod dynamic;
mod gender;
mod handle;
mod rooms;
mod state;

pub use dynamic::{DynRoomPolicy, DynamicRooms, Strategy};
pub use gender::{GenderLock, GenderRoomLock};
pub use handle::RoomLock;
pub use rooms::{RoomPolicy, RoomSynchronizer};
