/*!
The weakly-consistent slot-by-slot iterator (spec §6).

Walks the backing array directly rather than any chain: every `used=1`
slot is yielded exactly once, regardless of which bucket it belongs to.
Because it never coordinates with concurrent writers, it sees whatever
subset of entries happened to be live at the moment each slot was read —
"weakly consistent" in the same sense the teacher's own lock-free
traversal documents for its read-only snapshot walks.
*/

use std::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::codec::{RESERVED_SLOTS, SlotWord};

pub struct Iter<'a> {
    slots: &'a [CachePadded<std::sync::atomic::AtomicU64>],
    next_index: u32,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(slots: &'a [CachePadded<std::sync::atomic::AtomicU64>]) -> Self {
        Self { slots, next_index: RESERVED_SLOTS }
    }
}

impl<'a> Iterator for Iter<'a> {
    /// facade index (already offset by the reserved-slot count) of a
    /// slot observed live at read time
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while (self.next_index as usize) < self.slots.len() {
            let idx = self.next_index;
            self.next_index += 1;
            let word = SlotWord::from_raw(self.slots[idx as usize].load(Ordering::Acquire));
            if word.used() {
                return Some(idx - RESERVED_SLOTS);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn yields_only_used_slots() {
        let slots: Box<[CachePadded<AtomicU64>]> =
            (0..8).map(|_| CachePadded::new(AtomicU64::new(0))).collect();
        slots[0].store(SlotWord::UNWRITTEN.with_removed(true).raw(), Ordering::Relaxed);
        slots[1].store(SlotWord::UNWRITTEN.with_removed(true).raw(), Ordering::Relaxed);
        slots[3].store(SlotWord::UNWRITTEN.claim_entry(1, 1, 3).raw(), Ordering::Relaxed);
        slots[6].store(SlotWord::UNWRITTEN.claim_entry(2, 1, 3).raw(), Ordering::Relaxed);
        let got: Vec<u32> = Iter::new(&slots).collect();
        assert_eq!(got, vec![1, 4]);
    }

    #[test]
    fn empty_table_yields_nothing() {
        let slots: Box<[CachePadded<AtomicU64>]> =
            (0..4).map(|_| CachePadded::new(AtomicU64::new(0))).collect();
        assert_eq!(Iter::new(&slots).count(), 0);
    }
}
