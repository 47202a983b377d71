/*!
 * Mode-Tagged State Word
 *
 * Encoding for the four-mode lock. The top two bits carry the mode
 * tag; the low 30 bits carry counts:
 *
 * - `00` free: the whole word is zero.
 * - `10` intent-readers + readers: upper 15 bits count intent-readers,
 *   lower 15 bits count readers.
 * - `01` intent-readers + intent-writers: upper 15 bits count
 *   intent-readers, lower 15 bits count intent-writers.
 * - `11` exclusive: all 30 bits are one reentrancy count.
 *
 * Everything here is pure math over `u32`; the CAS loops live in the
 * policy. Requests are themselves state-shaped words carrying one
 * nonzero count.
 */

use crate::sync::NotHeld;

pub(crate) const MODE_MASK: u32 = 0xC000_0000;
pub(crate) const EXCL_COUNT: u32 = !MODE_MASK;
pub(crate) const IR_SHIFT: u32 = 15;
pub(crate) const LOWER_COUNT: u32 = 0x7FFF;
pub(crate) const UPPER_COUNT: u32 = LOWER_COUNT << IR_SHIFT;

pub(crate) const FREE: u32 = 0;
pub(crate) const READERS: u32 = 0x8000_0000;
pub(crate) const INTENT_WRITERS: u32 = 0x4000_0000;
pub(crate) const EXCLUSIVE: u32 = READERS | INTENT_WRITERS;

/// Intent-read request in its canonical (readers-tag) form.
pub(crate) const IR_REQ: u32 = READERS | (1 << IR_SHIFT);
/// Intent-read request rewritten for an intent-writers occupancy.
pub(crate) const ALT_IR_REQ: u32 = INTENT_WRITERS | (1 << IR_SHIFT);
pub(crate) const READ_REQ: u32 = READERS | 1;
pub(crate) const IW_REQ: u32 = INTENT_WRITERS | 1;
pub(crate) const WRITE_REQ: u32 = EXCLUSIVE | 1;

/// A count field would exceed its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Saturated;

#[inline(always)]
pub(crate) fn mode(s: u32) -> u32 {
    s & MODE_MASK
}

#[inline(always)]
pub(crate) fn is_exclusive(s: u32) -> bool {
    mode(s) == EXCLUSIVE
}

/// Readers are present (reader count, not merely the readers tag).
#[inline(always)]
pub(crate) fn has_readers(s: u32) -> bool {
    mode(s) == READERS && lower_count(s) != 0
}

/// Intent-writers are present.
#[inline(always)]
pub(crate) fn has_intent_writers(s: u32) -> bool {
    mode(s) == INTENT_WRITERS && lower_count(s) != 0
}

#[inline(always)]
pub(crate) fn lower_count(s: u32) -> u32 {
    s & LOWER_COUNT
}

#[inline(always)]
pub(crate) fn upper_count(s: u32) -> u32 {
    (s & UPPER_COUNT) >> IR_SHIFT
}

/// The combined low-30-bit count field.
#[inline(always)]
pub(crate) fn exclusive_count(s: u32) -> u32 {
    s & EXCL_COUNT
}

#[inline(always)]
fn lower_at_max(s: u32) -> bool {
    s & LOWER_COUNT == LOWER_COUNT
}

#[inline(always)]
fn upper_at_max(s: u32) -> bool {
    s & UPPER_COUNT == UPPER_COUNT
}

/// An intent-read hold may coexist with readers or with intent-writers,
/// so its request adopts the tag of whichever shared mode is installed.
/// All other requests pass through unchanged.
#[inline]
pub(crate) fn effective_request(s: u32, r: u32) -> u32 {
    if r == IR_REQ && mode(s) == INTENT_WRITERS {
        ALT_IR_REQ
    } else {
        r
    }
}

/// Compatibility check for a (normalized) shared request against the
/// observed state.
pub(crate) fn can_acquire_shared(s: u32, r: u32) -> bool {
    if s == FREE {
        return true;
    }
    if is_exclusive(s) {
        return false;
    }
    if has_readers(s) && has_intent_writers(r) {
        return false;
    }
    if has_intent_writers(s) && has_readers(r) {
        return false;
    }
    true
}

/// Merges a compatible shared request into the state. The request's
/// tag wins, which is only reachable when every present holder is
/// tag-ambivalent (intent-readers), so the result names the active
/// occupancy correctly.
pub(crate) fn acquired_shared(s: u32, r: u32) -> Result<u32, Saturated> {
    if s == FREE {
        return Ok(r);
    }
    if (lower_at_max(s) && lower_count(r) != 0) || (upper_at_max(s) && upper_count(r) != 0) {
        return Err(Saturated);
    }
    Ok(r + exclusive_count(s))
}

/// Mode check for a (normalized) shared release.
pub(crate) fn can_release_shared(s: u32, r: u32) -> Result<(), NotHeld> {
    if s == FREE || is_exclusive(s) {
        return Err(NotHeld);
    }
    if has_readers(s) && has_intent_writers(r) {
        return Err(NotHeld);
    }
    if has_intent_writers(s) && has_readers(r) {
        return Err(NotHeld);
    }
    Ok(())
}

/// Subtracts a shared release from the state. With requests normalized
/// by [`effective_request`], the sole-intent-reader-under-intent-write
/// residue compares equal to its release request and frees the lock.
pub(crate) fn released_shared(s: u32, r: u32) -> Result<u32, NotHeld> {
    if s == r {
        return Ok(FREE);
    }
    if lower_count(s) < lower_count(r) || upper_count(s) < upper_count(r) {
        return Err(NotHeld);
    }
    Ok(s - exclusive_count(r))
}

/// Adds a reentrant exclusive request onto an exclusively-held state.
pub(crate) fn acquired_exclusive(s: u32, r: u32) -> Result<u32, Saturated> {
    let held = exclusive_count(s);
    let wanted = exclusive_count(r);
    if held > EXCL_COUNT - wanted {
        return Err(Saturated);
    }
    Ok(r + held)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_words_are_single_count_states() {
        assert_eq!(lower_count(READ_REQ), 1);
        assert_eq!(upper_count(READ_REQ), 0);
        assert_eq!(lower_count(IW_REQ), 1);
        assert_eq!(upper_count(IR_REQ), 1);
        assert_eq!(lower_count(IR_REQ), 0);
        assert_eq!(exclusive_count(WRITE_REQ), 1);
        assert!(is_exclusive(WRITE_REQ));
    }

    #[test]
    fn test_compatibility_matrix() {
        let ir = IR_REQ;
        let r = READ_REQ;
        let iw = IW_REQ;

        // Readers occupancy.
        let readers = acquired_shared(FREE, r).unwrap();
        assert!(can_acquire_shared(readers, r));
        assert!(can_acquire_shared(readers, effective_request(readers, ir)));
        assert!(!can_acquire_shared(readers, iw));

        // Intent-writers occupancy.
        let writersish = acquired_shared(FREE, iw).unwrap();
        assert!(can_acquire_shared(writersish, iw));
        assert!(can_acquire_shared(writersish, effective_request(writersish, ir)));
        assert!(!can_acquire_shared(writersish, r));

        // Exclusive occupancy admits nothing shared.
        assert!(!can_acquire_shared(WRITE_REQ, r));
        assert!(!can_acquire_shared(WRITE_REQ, ir));
        assert!(!can_acquire_shared(WRITE_REQ, iw));
    }

    #[test]
    fn test_intent_read_adopts_installed_tag() {
        assert_eq!(effective_request(IW_REQ, IR_REQ), ALT_IR_REQ);
        assert_eq!(effective_request(READ_REQ, IR_REQ), IR_REQ);
        assert_eq!(effective_request(FREE, IR_REQ), IR_REQ);
        // Non-intent-read requests never rewrite.
        assert_eq!(effective_request(IW_REQ, READ_REQ), READ_REQ);
    }

    #[test]
    fn test_merge_preserves_active_tag() {
        // Intent-reader joining intent-writers keeps the tag.
        let s = IW_REQ;
        let r = effective_request(s, IR_REQ);
        let merged = acquired_shared(s, r).unwrap();
        assert_eq!(mode(merged), INTENT_WRITERS);
        assert_eq!(upper_count(merged), 1);
        assert_eq!(lower_count(merged), 1);

        // Intent-writer leaving strands the intent-reader in the
        // alternate form, which its own release maps to free.
        let residue = released_shared(merged, IW_REQ).unwrap();
        assert_eq!(residue, ALT_IR_REQ);
        let freed = released_shared(residue, effective_request(residue, IR_REQ)).unwrap();
        assert_eq!(freed, FREE);
    }

    #[test]
    fn test_reader_joins_residual_intent_readers() {
        // Only intent-readers left under the intent-writers tag: a
        // reader may join, and the merge re-tags to the reader form.
        let residue = ALT_IR_REQ;
        assert!(can_acquire_shared(residue, READ_REQ));
        let merged = acquired_shared(residue, READ_REQ).unwrap();
        assert_eq!(mode(merged), READERS);
        assert_eq!(upper_count(merged), 1);
        assert_eq!(lower_count(merged), 1);
    }

    #[test]
    fn test_lower_count_saturation() {
        let full = READERS | LOWER_COUNT;
        assert_eq!(acquired_shared(full, READ_REQ), Err(Saturated));
        // An intent-reader still fits: only the upper field grows.
        assert!(acquired_shared(full, IR_REQ).is_ok());
    }

    #[test]
    fn test_upper_count_saturation() {
        let full = READERS | UPPER_COUNT;
        assert_eq!(acquired_shared(full, IR_REQ), Err(Saturated));
        assert!(acquired_shared(full, READ_REQ).is_ok());
    }

    #[test]
    fn test_exclusive_count_saturation() {
        let nearly = EXCLUSIVE | (EXCL_COUNT - 1);
        assert_eq!(acquired_exclusive(nearly, WRITE_REQ).unwrap(), EXCLUSIVE | EXCL_COUNT);
        let full = EXCLUSIVE | EXCL_COUNT;
        assert_eq!(acquired_exclusive(full, WRITE_REQ), Err(Saturated));
    }

    #[test]
    fn test_release_underflow_is_rejected() {
        // One intent-reader present; a plain-read release is bogus.
        assert_eq!(released_shared(IR_REQ, READ_REQ), Err(NotHeld));
    }

    #[test]
    fn test_release_mode_mismatch_is_rejected() {
        let readers = acquired_shared(FREE, READ_REQ).unwrap();
        assert!(can_release_shared(readers, IW_REQ).is_err());
        let writersish = acquired_shared(FREE, IW_REQ).unwrap();
        assert!(can_release_shared(writersish, READ_REQ).is_err());
        assert!(can_release_shared(FREE, READ_REQ).is_err());
        assert!(can_release_shared(WRITE_REQ, READ_REQ).is_err());
    }

    #[test]
    fn test_acquire_release_round_trip() {
        let mut s = FREE;
        for req in [READ_REQ, READ_REQ, IR_REQ] {
            let r = effective_request(s, req);
            assert!(can_acquire_shared(s, r));
            s = acquired_shared(s, r).unwrap();
        }
        assert_eq!(lower_count(s), 2);
        assert_eq!(upper_count(s), 1);
        for req in [IR_REQ, READ_REQ, READ_REQ] {
            let r = effective_request(s, req);
            can_release_shared(s, r).unwrap();
            s = released_shared(s, r).unwrap();
        }
        assert_eq!(s, FREE);
    }
}
