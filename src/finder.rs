/*!
Component C — the wait-free read-path cursor.

A [`Finder`] never mutates the table: it is a pure traversal over the
packed state words, bounded by the ordered-chain invariant (`hash` fields
non-decreasing along a chain) so a miss is detected the moment the walk
passes the target tag, without ever having to reach the literal end of the
chain. Grounded on the teacher's lock-free lookup walk in `idx::mtchm`
(`SharedNode` traversal with an ordered discriminant check), adapted from a
trie descent to a single linked chain.
*/

use std::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::codec::SlotWord;

/// Outcome of a single [`Finder::next`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStep {
    /// a live entry with a matching tag was found; holds its array index
    /// (already offset by the reserved-slot count, i.e. a facade index)
    Found(u32),
    /// the chain was exhausted, or the ordered walk passed the target tag
    /// without finding it
    NotFound,
    /// a touched slot had `resizing=1`; the caller must migrate and retry
    Resize,
}

/// A read-only cursor over one bucket chain. Safe to hold across calls to
/// `replace`/`remove` performed by some other cursor: [`Finder::reload`]
/// re-reads the current position from scratch.
pub struct Finder<'a> {
    slots: &'a [CachePadded<std::sync::atomic::AtomicU64>],
    b: u32,
    home: u32,
    tag: u32,
    /// 0 means "not yet started: read head of `home`"; otherwise the last
    /// entry index visited, whose `next` field is where to resume.
    cursor: u32,
}

impl<'a> Finder<'a> {
    pub fn new(slots: &'a [CachePadded<std::sync::atomic::AtomicU64>], b: u32, home: u32, tag: u32) -> Self {
        Self { slots, b, home, tag, cursor: 0 }
    }

    #[inline(always)]
    fn load(&self, index: u32) -> SlotWord {
        SlotWord::from_raw(self.slots[index as usize].load(Ordering::Acquire))
    }

    /// Re-reads the current position in place; used after handing an
    /// index to an Updater that performed a replace (spec §4.C.4).
    pub fn reload(&mut self) {
        // nothing cached beyond plain indices, so a fresh `next()` call
        // from the same cursor position already re-reads live state;
        // this only exists to document the contract callers rely on.
    }

    /// Advances the walk, returning the first live entry with
    /// `hash-field == tag`, `NotFound` once the ordered walk passes it, or
    /// `Resize` if migration is in progress on a touched slot.
    pub fn next(&mut self) -> FindStep {
        let mut at = if self.cursor == 0 {
            self.load(self.home).head()
        } else {
            self.load(self.cursor).next(self.b)
        };
        loop {
            if at < 2 {
                return FindStep::NotFound;
            }
            let word = self.load(at);
            if word.resizing() {
                return FindStep::Resize;
            }
            if word.used() {
                let h = word.hash(self.b);
                if h == self.tag {
                    self.cursor = at;
                    return FindStep::Found(at - crate::codec::RESERVED_SLOTS);
                }
                if h > self.tag {
                    return FindStep::NotFound;
                }
                self.cursor = at;
                at = word.next(self.b);
                continue;
            }
            // logically removed: skip without assisting, its `next`
            // still points forward through the chain
            at = word.next(self.b);
        }
    }
}
