/*!
Component E — cooperative migration.

A [`Resizer`] is installed on the old table's resizer handle by whichever
thread wins a CAS race; everyone else joins the same instance rather than
starting a redundant migration. Work is distributed over the old table's
buckets via the [`RangeSplitter`] (§4.F), each unit being one batch of
`C::MIGRATION_BATCH` consecutive old-table slots. Grounded on the teacher's
shard-rehash loop in `corelib`'s sharded index rebuild, reworked into a
lock-free helper-assist protocol instead of a single-writer rebuild.
*/

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_utils::CachePadded;

use crate::codec::{SlotWord, rehash_for_resize};
use crate::config::TableConfig;
use crate::hooks::TableHooks;
use crate::splitter::RangeSplitter;
use crate::table::Table;

type Slots = Box<[CachePadded<std::sync::atomic::AtomicU64>]>;

/// Picks the next table size: doubles, clamped to `[MIN_SIZE, MAX_SIZE]`.
/// A zero-capacity bootstrap table (see `Table::bootstrap`) always grows
/// straight to `MIN_SIZE`.
pub fn next_capacity<C: TableConfig>(old_capacity: u32) -> Option<u32> {
    let doubled = if old_capacity < C::MIN_SIZE { C::MIN_SIZE } else { old_capacity.saturating_mul(2) };
    if doubled > C::MAX_SIZE { None } else { Some(doubled) }
}

pub struct Resizer<H: TableHooks, C: TableConfig> {
    pub new_table: Arc<Table<H, C>>,
    splitter: RangeSplitter,
    done: AtomicBool,
    arrivals: AtomicU32,
    init_start: Instant,
}

/// Per-child-bucket tail cache so a migrating thread doesn't re-walk a
/// new bucket's chain for every old entry it appends (spec §4.E.3).
struct TailCache {
    factor: usize,
    tails: Vec<u32>,
}

impl TailCache {
    fn new(factor: usize) -> Self {
        Self { tails: vec![0; factor], factor }
    }
    fn get(&self, child_offset: usize) -> u32 {
        debug_assert!(child_offset < self.factor);
        self.tails[child_offset]
    }
    fn set(&mut self, child_offset: usize, tail: u32) {
        self.tails[child_offset] = tail;
    }
}

impl<H: TableHooks, C: TableConfig> Resizer<H, C> {
    /// `old_capacity` is only used to size the splitter's batch count;
    /// the new array is sized directly from `new_capacity`.
    pub fn new(old_capacity: u32, new_capacity: u32) -> Self {
        let old_batch_count = old_capacity.div_ceil(C::MIGRATION_BATCH).max(1);
        Self {
            new_table: Arc::new(Table::fresh(new_capacity)),
            splitter: RangeSplitter::new(0, old_batch_count, C::SPLITTER_MAX_RANGES.min(old_batch_count as usize)),
            done: AtomicBool::new(false),
            arrivals: AtomicU32::new(0),
            init_start: Instant::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn lane_count(&self) -> usize {
        self.splitter.lane_count()
    }

    /// A joining helper's arrival rank, used to scale its allocation
    /// failover timeout (spec §4.E: "~10s × arrival rank").
    pub fn next_arrival_rank(&self) -> u32 {
        self.arrivals.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn failover_deadline(&self, rank: u32) -> Instant {
        self.init_start + std::time::Duration::from_millis(C::RESIZE_FAILOVER_BASE_MS * rank as u64)
    }

    /// Drains and migrates whole batches for `lane` until the splitter
    /// runs dry, then flags completion once every lane has drained.
    pub fn migrate(&self, old_slots: &[CachePadded<std::sync::atomic::AtomicU64>], old_b: u32, old_hooks: &H, lane: usize) {
        let factor = 1usize << (self.new_table.b - old_b);
        let mut tails = TailCache::new(factor);
        while let Some(batch) = self.splitter.take(lane) {
            let start = batch * C::MIGRATION_BATCH;
            let end = (start + C::MIGRATION_BATCH).min(old_slots.len() as u32);
            // highest-slot-first within the batch (spec §4.E)
            for home in (start..end).rev() {
                self.migrate_bucket(old_slots, old_b, old_hooks, home, &mut tails);
            }
        }
        if self.splitter.is_drained() {
            self.done.store(true, Ordering::Release);
        }
    }

    fn migrate_bucket(
        &self,
        old_slots: &[CachePadded<std::sync::atomic::AtomicU64>],
        old_b: u32,
        old_hooks: &H,
        home: u32,
        tails: &mut TailCache,
    ) {
        // slots 0 and 1 are perfectly valid home buckets (only excluded
        // from ever being an entry body), so their chains still migrate
        freeze_slot(&old_slots[home as usize]);
        let head_word = SlotWord::from_raw(old_slots[home as usize].load(Ordering::Acquire));
        let mut at = head_word.head();
        while at >= 2 {
            let word = SlotWord::from_raw(old_slots[at as usize].load(Ordering::Acquire));
            if word.used() {
                let old_tag = word.hash(old_b);
                let (new_bucket, new_tag) = rehash_for_resize(home, old_tag, old_b, self.new_table.b);
                let child_offset = (new_bucket - (home << (self.new_table.b - old_b))) as usize;
                self.append_migrated(new_bucket, new_tag, old_hooks, at, tails, child_offset.min(tails.factor - 1));
            }
            at = word.next(old_b);
        }
    }

    /// Appends one migrated entry to the tail of its new bucket's chain,
    /// fast-pathing the common case where the tail is the (empty) home
    /// slot of the new bucket (spec §4.E "Appending a migrated entry").
    fn append_migrated(
        &self,
        new_bucket: u32,
        new_tag: u32,
        old_hooks: &H,
        old_index: u32,
        tails: &mut TailCache,
        child_offset: usize,
    ) {
        let new_slots = &self.new_table.slots;
        let new_b = self.new_table.b;
        let home_index = new_bucket;
        let mut tail = if tails.get(child_offset) == 0 { home_index } else { tails.get(child_offset) };
        loop {
            if tail == home_index {
                let home_raw = SlotWord::from_raw(new_slots[home_index as usize].load(Ordering::Acquire));
                if home_raw.is_free() {
                    let claimed = home_raw.claim_entry(new_tag, 1, new_b);
                    if new_slots[home_index as usize]
                        .compare_exchange(home_raw.raw(), claimed.raw(), Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.new_table.hooks.copy(old_hooks, old_index - crate::codec::RESERVED_SLOTS, home_index - crate::codec::RESERVED_SLOTS);
                        let head_raw = SlotWord::from_raw(new_slots[home_index as usize].load(Ordering::Acquire));
                        let linked = head_raw.with_head(home_index);
                        let _ = new_slots[home_index as usize].compare_exchange(
                            head_raw.raw(),
                            linked.raw(),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                        self.new_table.size.record_insert();
                        tails.set(child_offset, home_index);
                        return;
                    }
                }
            }
            // contended path: reserve a fresh slot, copy, link at tail
            match crate::alloc::alloc::<C>(new_slots, new_b, tail, new_tag, 1, false, || 0) {
                crate::alloc::AllocOutcome::Reserved(idx) => {
                    self.new_table.hooks.copy(old_hooks, old_index - crate::codec::RESERVED_SLOTS, idx - crate::codec::RESERVED_SLOTS);
                    let tail_raw = SlotWord::from_raw(new_slots[tail as usize].load(Ordering::Acquire));
                    let linked_word =
                        if tail == home_index { tail_raw.with_head(idx) } else { tail_raw.with_next(idx, new_b) };
                    if new_slots[tail as usize]
                        .compare_exchange(tail_raw.raw(), linked_word.raw(), Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.new_table.size.record_insert();
                        tails.set(child_offset, idx);
                        return;
                    }
                    // another helper linked first; free our reservation and
                    // advance to whatever now occupies the link
                    crate::alloc::abandon(new_slots, idx);
                    let refreshed = SlotWord::from_raw(new_slots[tail as usize].load(Ordering::Acquire));
                    let competitor = if tail == home_index { refreshed.head() } else { refreshed.next(new_b) };
                    if competitor >= 2 {
                        tail = competitor;
                    }
                }
                crate::alloc::AllocOutcome::NeedsResize => {
                    // the new table itself is already under pressure; this
                    // should not happen for a correctly sized migration
                    // target, but fall back to retrying from the home slot
                    tail = home_index;
                }
            }
        }
    }
}

fn freeze_slot(cell: &std::sync::atomic::AtomicU64) {
    loop {
        let raw = cell.load(Ordering::Acquire);
        let w = SlotWord::from_raw(raw);
        if w.resizing() {
            return;
        }
        let frozen = w.with_resizing(true);
        if cell.compare_exchange(raw, frozen.raw(), Ordering::AcqRel, Ordering::Acquire).is_ok() {
            return;
        }
    }
}
