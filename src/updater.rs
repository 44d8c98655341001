/*!
Component D — the lock-free write-path cursor.

Per-thread, re-usable, non-reentrant: callers drive one [`Updater`] through
`next()` / `alloc()` / `insert()` / `replace()` / `remove()` / `restart()` /
`close()` and release it on every exit path. This is the densest component
in the core (spec §2 puts it at roughly a third of the line count) because
it is where the ordered-chain invariant, the Allocator, and the ABA-safety
rules of the codec all meet. Grounded on the teacher's CAS-retry insert loop
in `idx::mtchm` (`WriteModeSplit`/`patch` in the tree index), generalized
from a trie edge to a sorted singly-linked chain with helper-assisted
unlinking.
*/

use std::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::alloc::{self, AllocOutcome};
use crate::codec::{RESERVED_SLOTS, SlotWord, encode_ptr};
use crate::config::TableConfig;
use crate::hooks::TableHooks;
use crate::table::SizeAccumulator;

/// Outcome of [`Updater::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// an entry with `hash == tag` was found; holds its facade index
    Found(u32),
    /// the walk passed the target tag (insertion point reached) or hit
    /// the end of the chain
    NotFound,
    /// a touched slot is frozen for migration
    Resize,
}

/// Outcome of [`Updater::alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStep {
    /// holds the newly reserved facade index
    Reserved(u32),
    Resize,
}

/// A mutating cursor over one bucket chain. Not `Send`/`Sync` on its own
/// merit — callers are expected to keep one per thread (spec §5: "the
/// Updater is thread-local and re-used").
pub struct Updater<'a, H: TableHooks, C: TableConfig> {
    slots: &'a [CachePadded<std::sync::atomic::AtomicU64>],
    b: u32,
    home: u32,
    tag: u32,
    /// 0 means "the previous link lives in the home slot's `head` field"
    prev_index: u32,
    prev_word: SlotWord,
    /// 0 means "no entry currently targeted"
    curr_index: u32,
    curr_word: SlotWord,
    reserved: Option<u32>,
    hooks: &'a H,
    size: &'a SizeAccumulator,
    _config: std::marker::PhantomData<C>,
}

impl<'a, H: TableHooks, C: TableConfig> Updater<'a, H, C> {
    pub fn new(
        slots: &'a [CachePadded<std::sync::atomic::AtomicU64>],
        b: u32,
        home: u32,
        tag: u32,
        hooks: &'a H,
        size: &'a SizeAccumulator,
    ) -> Self {
        Self {
            slots,
            b,
            home,
            tag,
            prev_index: 0,
            prev_word: SlotWord::UNWRITTEN,
            curr_index: 0,
            curr_word: SlotWord::UNWRITTEN,
            reserved: None,
            hooks,
            size,
            _config: std::marker::PhantomData,
        }
    }

    #[inline(always)]
    fn load(&self, index: u32) -> SlotWord {
        SlotWord::from_raw(self.slots[index as usize].load(Ordering::Acquire))
    }

    #[inline(always)]
    fn prev_slot(&self) -> u32 {
        if self.prev_index == 0 { self.home } else { self.prev_index }
    }

    #[inline(always)]
    fn link_of(&self, prev_word: SlotWord) -> u32 {
        if self.prev_index == 0 { prev_word.head() } else { prev_word.next(self.b) }
    }

    fn cas_link(&self, prev_word: SlotWord, new_target: u32) -> bool {
        let updated =
            if self.prev_index == 0 { prev_word.with_head(new_target) } else { prev_word.with_next(new_target, self.b) };
        self.slots[self.prev_slot() as usize]
            .compare_exchange(prev_word.raw(), updated.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Resets the cursor to the home slot, discarding (but not releasing)
    /// any in-flight position — used after a CAS race forces a re-walk.
    /// A reservation obtained via [`Updater::alloc`] survives a restart
    /// and is reused by the next `insert`/`replace`.
    pub fn restart(&mut self) {
        self.prev_index = 0;
        self.curr_index = 0;
        self.prev_word = SlotWord::UNWRITTEN;
        self.curr_word = SlotWord::UNWRITTEN;
    }

    /// Advances to the first live entry with `hash ≥ tag`.
    pub fn next(&mut self) -> NextStep {
        if self.curr_index >= 2 {
            self.prev_index = self.curr_index;
            self.curr_index = 0;
        }
        loop {
            let prev_word = self.load(self.prev_slot());
            let target = self.link_of(prev_word);
            if target < 2 {
                self.prev_word = prev_word;
                return NextStep::NotFound;
            }
            let word = self.load(target);
            if word.resizing() {
                return NextStep::Resize;
            }
            if word.used() {
                let h = word.hash(self.b);
                self.prev_word = prev_word;
                if h < self.tag {
                    self.prev_index = target;
                    continue;
                }
                self.curr_index = target;
                self.curr_word = word;
                return if h == self.tag { NextStep::Found(target - RESERVED_SLOTS) } else { NextStep::NotFound };
            }
            // logically removed: help unlink, then retry from the same prev
            let redirect = word.next(self.b);
            self.cas_link(prev_word, redirect);
        }
    }

    /// Reserves a slot for a new entry body. Prefers the in-place fast
    /// path (home slot doubles as its own first entry) when the cursor
    /// sits at the home slot and that slot is untouched.
    pub fn alloc(&mut self, resizer_installed: bool, size_hint: impl FnOnce() -> u64) -> AllocStep {
        let next_field = encode_ptr(self.curr_index);
        if self.prev_index == 0 {
            let home_raw = self.load(self.home);
            if home_raw.is_free() {
                let claimed = home_raw.claim_entry(self.tag, next_field, self.b);
                if self.slots[self.home as usize]
                    .compare_exchange(home_raw.raw(), claimed.raw(), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.reserved = Some(self.home);
                    return AllocStep::Reserved(self.home - RESERVED_SLOTS);
                }
            }
        }
        let start = self.prev_index.max(self.home);
        match alloc::alloc::<C>(self.slots, self.b, start, self.tag, next_field, resizer_installed, size_hint) {
            AllocOutcome::Reserved(idx) => {
                self.reserved = Some(idx);
                AllocStep::Reserved(idx - RESERVED_SLOTS)
            }
            AllocOutcome::NeedsResize => AllocStep::Resize,
        }
    }

    /// Links a previously reserved, never-linked entry into the chain
    /// ahead of the cursor's current position. Returns `false` on a lost
    /// CAS race; the caller should `restart()` and retry the whole
    /// operation (the reservation is preserved).
    pub fn insert(&mut self) -> bool {
        let idx = self.reserved.expect("insert() called without a prior alloc()");
        let want_next = encode_ptr(self.curr_index);
        loop {
            let raw = self.load(idx);
            if raw.next(self.b) == want_next {
                break;
            }
            let patched = raw.with_next(want_next, self.b);
            if self.slots[idx as usize]
                .compare_exchange(raw.raw(), patched.raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let prev_word = self.load(self.prev_slot());
        if encode_ptr(self.link_of(prev_word)) != want_next {
            return false;
        }
        if self.cas_link(prev_word, idx) {
            self.size.record_insert();
            self.reserved = None;
            true
        } else {
            false
        }
    }

    /// Replaces the entry at the cursor's current position with the
    /// reserved index, redirecting stale readers of the old index
    /// forward. Net effect on size is zero (+1 insert, +1 remove).
    pub fn replace(&mut self) -> bool {
        let idx = self.reserved.expect("replace() called without a prior alloc()");
        let cur_idx = self.curr_index;
        debug_assert!(cur_idx >= 2, "replace() requires a prior next() that returned Found");
        let cur_raw = self.load(cur_idx);
        if !cur_raw.used() {
            return false;
        }
        let old_next = cur_raw.next(self.b);
        loop {
            let raw = self.load(idx);
            if raw.next(self.b) == old_next {
                break;
            }
            let patched = raw.with_next(old_next, self.b);
            if self.slots[idx as usize]
                .compare_exchange(raw.raw(), patched.raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let removed_word = cur_raw.logically_remove(idx, self.b);
        if self.slots[cur_idx as usize]
            .compare_exchange(cur_raw.raw(), removed_word.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.hooks.reset(cur_idx - RESERVED_SLOTS);
        let prev_word = self.load(self.prev_slot());
        if self.link_of(prev_word) == encode_ptr(cur_idx) {
            self.cas_link(prev_word, idx);
        }
        self.size.record_replace();
        self.reserved = None;
        true
    }

    /// Logically removes the entry at the cursor's current position.
    pub fn remove(&mut self) -> bool {
        let cur_idx = self.curr_index;
        debug_assert!(cur_idx >= 2, "remove() requires a prior next() that returned Found");
        let cur_raw = self.load(cur_idx);
        if !cur_raw.used() {
            return false;
        }
        let removed_word = cur_raw.logically_remove(cur_raw.next(self.b), self.b);
        if self.slots[cur_idx as usize]
            .compare_exchange(cur_raw.raw(), removed_word.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.hooks.reset(cur_idx - RESERVED_SLOTS);
        let prev_word = self.load(self.prev_slot());
        if self.link_of(prev_word) == encode_ptr(cur_idx) {
            self.cas_link(prev_word, cur_raw.next(self.b));
        }
        self.size.record_remove();
        true
    }

    /// Releases a reservation obtained via `alloc()` that was never
    /// linked in, so it cannot leak table capacity (spec §4.D).
    pub fn close(&mut self) {
        if let Some(idx) = self.reserved.take() {
            alloc::abandon(self.slots, idx);
            self.hooks.reset(idx - RESERVED_SLOTS);
        }
    }
}

impl<'a, H: TableHooks, C: TableConfig> Drop for Updater<'a, H, C> {
    fn drop(&mut self) {
        self.close();
    }
}
