/*!
The table itself: the backing slot array, the sharded size accumulator,
and the entry points a facade drives (`finder`, `updater`, `iterator`,
`resize`, `size`/`capacity`/`tab_size`). Ties components A–F together.
Grounded on the teacher's top-level index struct (`idx::mtchm::MTHashMap`
/ `Guard`-mediated entry points) generalized from a trie root to a flat
packed-state array, and on `idx::meta::Metadata`'s striped-counter idea
for `SizeAccumulator`.
*/

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch as epoch;
use crossbeam_epoch::{Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;
use log::{debug, info};

use crate::codec::{RESERVED_SLOTS, SlotWord, mix, split};
use crate::config::{DefaultConfig, TableConfig};
use crate::error::{TableError, TableResult};
use crate::finder::Finder;
use crate::hooks::TableHooks;
use crate::iter::Iter;
use crate::resize::Resizer;
use crate::updater::Updater;

thread_local! {
    static THREAD_SLOT: Cell<Option<usize>> = Cell::new(None);
}
static NEXT_THREAD_SLOT: AtomicUsize = AtomicUsize::new(0);

/// Assigns each calling thread a stable small integer, reused both to
/// pick a [`SizeAccumulator`] shard and a migration-splitter lane — any
/// stable partition of threads works for either purpose.
pub(crate) fn thread_slot(modulus: usize) -> usize {
    let modulus = modulus.max(1);
    THREAD_SLOT.with(|c| {
        let v = c.get().unwrap_or_else(|| {
            let assigned = NEXT_THREAD_SLOT.fetch_add(1, Ordering::Relaxed);
            c.set(Some(assigned));
            assigned
        });
        v % modulus
    })
}

/// Eventually-consistent live-entry counter. One 64-bit word per shard,
/// packing inserts in the low 32 bits and removes in the high 32 bits
/// (spec §4.D); reads sum every shard, so `size()` is O(shards) rather
/// than O(1), which is why the Allocator only samples it on offset-zero
/// probes (spec §4.B).
pub struct SizeAccumulator {
    shards: Box<[CachePadded<AtomicU64>]>,
}

impl SizeAccumulator {
    pub fn new<C: TableConfig>() -> Self {
        Self { shards: (0..C::SIZE_SHARDS).map(|_| CachePadded::new(AtomicU64::new(0))).collect() }
    }

    #[inline]
    pub fn record_insert(&self) {
        let shard = thread_slot(self.shards.len());
        self.shards[shard].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remove(&self) {
        let shard = thread_slot(self.shards.len());
        self.shards[shard].fetch_add(1 << 32, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_replace(&self) {
        self.record_insert();
        self.record_remove();
    }

    pub fn load(&self) -> u64 {
        let mut inserts = 0u64;
        let mut removes = 0u64;
        for s in self.shards.iter() {
            let v = s.load(Ordering::Relaxed);
            inserts += v & 0xFFFF_FFFF;
            removes += v >> 32;
        }
        inserts.saturating_sub(removes)
    }
}

/// A non-blocking, cache-conscious concurrent hash table core. Generic
/// over `H`, the facade-owned side-array hook set (spec §6), and `C`, a
/// compile-time tuning profile (§4.B, §4.E).
pub struct Table<H: TableHooks, C: TableConfig = DefaultConfig> {
    pub(crate) slots: Box<[CachePadded<AtomicU64>]>,
    pub(crate) b: u32,
    pub(crate) capacity: u32,
    pub(crate) hooks: H,
    pub(crate) size: SizeAccumulator,
    resizer: Atomic<Resizer<H, C>>,
    _config: std::marker::PhantomData<C>,
}

impl<H: TableHooks, C: TableConfig> std::fmt::Debug for Table<H, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("b", &self.b)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<H: TableHooks, C: TableConfig> Table<H, C> {
    /// Builds an empty table of exactly `capacity` slots (already
    /// power-of-two checked by the caller). Slots 0 and 1 are stamped
    /// permanently non-free per spec §3's lifecycle rule.
    pub(crate) fn fresh(capacity: u32) -> Self {
        let slots: Box<[CachePadded<AtomicU64>]> =
            (0..capacity as usize).map(|_| CachePadded::new(AtomicU64::new(0))).collect();
        for i in 0..RESERVED_SLOTS as usize {
            slots[i].store(SlotWord::UNWRITTEN.with_removed(true).raw(), Ordering::Relaxed);
        }
        Self {
            slots,
            b: capacity.trailing_zeros(),
            capacity,
            hooks: H::create(capacity),
            size: SizeAccumulator::new::<C>(),
            resizer: Atomic::null(),
            _config: std::marker::PhantomData,
        }
    }

    /// Creates a table sized for at least `requested` live entries,
    /// rounded up to the next power of two and clamped to
    /// `[C::MIN_SIZE, C::MAX_SIZE]`.
    pub fn new(requested: u32) -> TableResult<Self> {
        if requested > C::MAX_SIZE {
            return Err(TableError::CapacityExceeded);
        }
        let capacity = requested.max(C::MIN_SIZE).next_power_of_two().max(C::MIN_SIZE);
        if capacity > C::MAX_SIZE {
            return Err(TableError::CapacityExceeded);
        }
        info!("creating table with capacity {capacity}");
        Ok(Self::fresh(capacity))
    }

    /// A degenerate table with no usable slots (only the two reserved
    /// sentinels). The very first insert immediately needs a resize,
    /// satisfying the boundary requirement that a zero-capacity table
    /// resizes on first use (spec §8).
    pub fn bootstrap() -> Self {
        Self::fresh(RESERVED_SLOTS.next_power_of_two().max(2))
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity.saturating_sub(RESERVED_SLOTS)
    }

    #[inline]
    pub fn tab_size(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size.load()
    }

    /// Maps a user hash to its home slot and tag. The home slot *is* the
    /// bucket index (spec §3: `h >>> (32-b)`) — no offset by
    /// [`RESERVED_SLOTS`] here. Slots 0 and 1 are perfectly valid home
    /// buckets; they are only ever excluded from serving as an *entry
    /// body*, which the codec enforces by stamping them non-free at
    /// creation (see [`Table::fresh`]).
    fn home_slot(&self, hash: u32) -> (u32, u32) {
        let mixed = mix(hash);
        split(mixed, self.b)
    }

    pub fn finder(&self, hash: u32) -> Finder<'_> {
        let (home, tag) = self.home_slot(hash);
        Finder::new(&self.slots, self.b, home, tag)
    }

    pub fn updater(&self, hash: u32) -> Updater<'_, H, C> {
        let (home, tag) = self.home_slot(hash);
        Updater::new(&self.slots, self.b, home, tag, &self.hooks, &self.size)
    }

    pub fn iterator(&self) -> Iter<'_> {
        Iter::new(&self.slots)
    }

    /// The facade-owned side-array hook set, for facades that need to
    /// write payload data into a freshly reserved slot between
    /// `Updater::alloc` and `Updater::insert` (spec §6).
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// `true` once a slot has `resizing=1` anywhere an Updater or Finder
    /// would have touched for this hash — a convenience used by facades
    /// driving the retry loop described in spec §4.C.
    pub fn resize_in_progress(&self) -> bool {
        let guard = epoch::pin();
        !self.resizer.load(Ordering::Acquire, &guard).is_null()
    }

    /// Idempotent join to the ongoing migration: installs a [`Resizer`]
    /// if none exists yet, then actively helps freeze and migrate
    /// batches until done, returning the same successor table to every
    /// caller (spec §6 `resize() -> newTable`). Fails with
    /// [`TableError::CapacityExceeded`] if the table is already at
    /// `C::MAX_SIZE` and no resizer is installed yet — the one
    /// capacity-exceeded path spec §7/§8 require on a genuinely full
    /// max-size table, surfaced to the caller rather than aborting it.
    pub fn resize(&self) -> TableResult<Arc<Table<H, C>>> {
        let guard = epoch::pin();
        let resizer = loop {
            let shared = self.resizer.load(Ordering::Acquire, &guard);
            if let Some(r) = unsafe { shared.as_ref() } {
                break r;
            }
            let Some(new_capacity) = crate::resize::next_capacity::<C>(self.capacity) else {
                return Err(TableError::CapacityExceeded);
            };
            let owned = Owned::new(Resizer::<H, C>::new(self.capacity, new_capacity));
            match self.resizer.compare_exchange(Shared::null(), owned, Ordering::AcqRel, Ordering::Acquire, &guard) {
                Ok(installed) => {
                    debug!("installed resizer: {} -> {} slots", self.capacity, new_capacity);
                    break unsafe { installed.as_ref() }.unwrap();
                }
                Err(e) => {
                    drop(e.new);
                    continue;
                }
            }
        };
        let lane = thread_slot(resizer.lane_count());
        let rank = resizer.next_arrival_rank();
        let deadline = resizer.failover_deadline(rank);
        while !resizer.is_done() {
            resizer.migrate(&self.slots, self.b, &self.hooks, lane);
            if resizer.is_done() {
                break;
            }
            if std::time::Instant::now() >= deadline {
                // liveness fallback: keep helping regardless, there is no
                // separate allocation step left to take over here since
                // the new array already exists (spec §4.E's timeout only
                // matters before the new array is published)
                debug!("helper {rank} exceeded its failover deadline, continuing to assist");
            }
        }
        Ok(resizer.new_table.clone())
    }

    /// Total entries, counting only logical (not tombstoned) ones. Alias
    /// kept distinct from `tab_size` per spec §6's naming.
    pub fn len(&self) -> u64 {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<H: TableHooks, C: TableConfig> Drop for Table<H, C> {
    fn drop(&mut self) {
        let guard = epoch::pin();
        let old = self.resizer.swap(Shared::null(), Ordering::AcqRel, &guard);
        if !old.is_null() {
            unsafe {
                guard.defer_destroy(old);
            }
        }
    }
}
