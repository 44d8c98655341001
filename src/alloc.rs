/*!
Component B — the probe-based allocator.

`alloc` reserves a currently-free slot near a target index via hybrid
linear/triangular probing, stamping its `used`/`hash`/`next` fields in the
same CAS that claims it. It never links the slot into a chain — that is the
Updater's job (§4.D). Grounded on the teacher's own open-addressing probe in
`idx::mtchm`'s bucket scan, generalized from "first empty bucket" to
"first free slot, linear-then-triangular, with an embedded resize trigger".
*/

use std::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::codec::{RESERVED_SLOTS, SlotWord};
use crate::config::TableConfig;

pub enum AllocOutcome {
    /// a free slot was claimed and stamped; holds its array index
    Reserved(u32),
    /// the table is full enough (or a resize is already underway) that
    /// the caller should migrate and retry
    NeedsResize,
}

/// Computes the `step`-th probe offset from `start`: the first
/// `C::LINEAR_PROBE_RUN` offsets are `1, 2, 3, ...`; thereafter the
/// offsets grow as `LINEAR_PROBE_RUN + triangular(q)` so that long runs of
/// other buckets' stamps don't force a full linear scan.
#[inline]
fn probe_offset<C: TableConfig>(step: u64) -> u64 {
    if step < C::LINEAR_PROBE_RUN as u64 {
        step + 1
    } else {
        let q = step - C::LINEAR_PROBE_RUN as u64 + 1;
        C::LINEAR_PROBE_RUN as u64 + (q * (q + 1)) / 2
    }
}

/// Reserves a free slot starting the probe at `start_index` (typically
/// `max(prev, home_slot)`, per §4.D). `size_hint` is called lazily, only
/// once the very first probe position is found occupied, to sample the
/// size accumulator without paying its cost on every allocation.
pub fn alloc<C: TableConfig>(
    slots: &[CachePadded<std::sync::atomic::AtomicU64>],
    b: u32,
    start_index: u32,
    tag: u32,
    next: u32,
    resizer_installed: bool,
    size_hint: impl FnOnce() -> u64,
) -> AllocOutcome {
    let capacity = slots.len() as u64;
    debug_assert_eq!(capacity, 1u64 << b);
    let mut size_hint = Some(size_hint);

    for step in 0..capacity {
        let offset = probe_offset::<C>(step);
        let idx = (start_index as u64 + offset) % capacity;
        let cell = &slots[idx as usize];
        let cur_raw = cell.load(Ordering::Acquire);
        let cur = SlotWord::from_raw(cur_raw);

        if !cur.is_free() {
            if step == 0 {
                if resizer_installed {
                    return AllocOutcome::NeedsResize;
                }
                if let Some(f) = size_hint.take() {
                    let used = f();
                    if used >= C::probe_fail_threshold(capacity as u32) {
                        return AllocOutcome::NeedsResize;
                    }
                }
            }
            continue;
        }

        let claimed = cur.claim_entry(tag, next, b);
        if cell
            .compare_exchange(cur_raw, claimed.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return AllocOutcome::Reserved(idx as u32);
        }
        // lost the race for this slot; move to the next probe position
        // rather than retrying the same index (another allocator may have
        // just claimed it for an unrelated bucket)
    }
    AllocOutcome::NeedsResize
}

/// Releases a claimed-but-never-linked reservation back to permanent
/// retirement (spec §4.D `close()`). Never returns the slot to the free
/// pool — see [`crate::codec::SlotWord::abandon_reservation`].
pub fn abandon(slots: &[CachePadded<std::sync::atomic::AtomicU64>], index: u32) {
    debug_assert!(index >= RESERVED_SLOTS);
    let cell = &slots[index as usize];
    loop {
        let cur_raw = cell.load(Ordering::Acquire);
        let cur = SlotWord::from_raw(cur_raw);
        let next_word = cur.abandon_reservation();
        if cell
            .compare_exchange(cur_raw, next_word.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use std::sync::atomic::AtomicU64;

    fn fresh_slots(n: usize) -> Box<[CachePadded<AtomicU64>]> {
        (0..n).map(|_| CachePadded::new(AtomicU64::new(0))).collect()
    }

    #[test]
    fn reserves_first_free_slot_linearly() {
        let slots = fresh_slots(64);
        let b = 6;
        match alloc::<DefaultConfig>(&slots, b, 10, 77, 1, false, || 0) {
            AllocOutcome::Reserved(idx) => assert_eq!(idx, 11, "first linear probe is start+1"),
            AllocOutcome::NeedsResize => panic!("table is empty, must not need resize"),
        }
        let w = SlotWord::from_raw(slots[11].load(Ordering::Acquire));
        assert!(w.used());
        assert_eq!(w.hash(b), 77);
        assert_eq!(w.next(b), 1);
    }

    #[test]
    fn skips_occupied_slots() {
        let slots = fresh_slots(64);
        let b = 6;
        // occupy start+1 directly
        slots[11].store(SlotWord::UNWRITTEN.claim_entry(1, 1, b).raw(), Ordering::Relaxed);
        match alloc::<DefaultConfig>(&slots, b, 10, 2, 1, false, || 0) {
            AllocOutcome::Reserved(idx) => assert_ne!(idx, 11),
            AllocOutcome::NeedsResize => panic!("plenty of free slots remain"),
        }
    }

    #[test]
    fn resizer_installed_short_circuits_on_first_occupied_probe() {
        let slots = fresh_slots(64);
        let b = 6;
        slots[11].store(SlotWord::UNWRITTEN.claim_entry(1, 1, 6).raw(), Ordering::Relaxed);
        match alloc::<DefaultConfig>(&slots, b, 10, 2, 1, true, || 0) {
            AllocOutcome::NeedsResize => {}
            AllocOutcome::Reserved(_) => panic!("must defer to the ongoing resize"),
        }
    }

    #[test]
    fn load_factor_trigger_fires_past_threshold() {
        let slots = fresh_slots(64);
        let b = 6;
        slots[11].store(SlotWord::UNWRITTEN.claim_entry(1, 1, 6).raw(), Ordering::Relaxed);
        // 64 * 15/16 == 60, so a size hint of 60 must trip the resize path
        match alloc::<DefaultConfig>(&slots, b, 10, 2, 1, false, || 60) {
            AllocOutcome::NeedsResize => {}
            AllocOutcome::Reserved(_) => panic!("load factor threshold must trigger resize"),
        }
    }

    #[test]
    fn abandon_permanently_retires_slot() {
        let slots = fresh_slots(64);
        let b = 6;
        let idx = match alloc::<DefaultConfig>(&slots, b, 10, 5, 1, false, || 0) {
            AllocOutcome::Reserved(i) => i,
            _ => unreachable!(),
        };
        abandon(&slots, idx);
        let w = SlotWord::from_raw(slots[idx as usize].load(Ordering::Acquire));
        assert!(!w.is_free(), "an abandoned reservation must never return to the free pool");
        assert!(w.removed());
    }
}
