/*!
 * Thread Identity
 *
 * A stable, unique identity for the calling thread, taken from the
 * address of a thread-local cell. The address is valid for the
 * thread's lifetime; a thread that exits while holding an exclusive
 * lock has already broken the locking protocol, so recycled addresses
 * are not a concern here.
 */

/// Returns a nonzero identity unique to the calling thread.
#[inline]
pub(crate) fn current_thread_id() -> usize {
    thread_local! {
        static SLOT: u8 = const { 0 };
    }
    SLOT.with(|slot| slot as *const u8 as usize)
}
