/*!
Component F — a dynamic work-stealing splitter over an integer range.

Used by the Resizer (§4.E) to hand out migration batches, but deliberately
free-standing (spec §4.F: "generally useful"). The shape — an array of
per-worker ranges, bisected on demand, CAS-published — is grounded on the
`ResizeCoordinator`/`task_list` idea sketched in the corpus's sharded
concurrent map (`BucketArray` in the `clashmap`/`dashmap` family), reworked
here as a single packed `AtomicU64` per range instead of a `Mutex<Vec<Range>>`
so that no worker ever blocks on a lock to pull its next unit of work.
*/

use std::sync::atomic::{AtomicU64, Ordering};

const UNASSIGNED: u64 = u64::MAX;

#[inline(always)]
fn pack(start: u32, end: u32) -> u64 {
    ((start as u64) << 32) | end as u64
}

#[inline(always)]
fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// A work-stealing splitter over `[start, end)`. Workers are addressed by a
/// fixed `lane` index in `0..lanes`; lane 0 starts with the whole range,
/// every other lane starts empty and is populated by bisection as idle
/// workers steal from the busiest lane.
pub struct RangeSplitter {
    lanes: Box<[AtomicU64]>,
}

impl RangeSplitter {
    /// `lanes` is clamped to at least 1; spec §4.F caps it at 256 but any
    /// positive count is safe here (the cap is an external tuning concern,
    /// see `TableConfig::SPLITTER_MAX_RANGES`).
    pub fn new(start: u32, end: u32, lanes: usize) -> Self {
        let lanes = lanes.max(1);
        let v: Vec<AtomicU64> = (0..lanes).map(|_| AtomicU64::new(UNASSIGNED)).collect();
        v[0].store(pack(start, end), Ordering::Relaxed);
        Self { lanes: v.into_boxed_slice() }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Takes the next integer for worker `lane`. Returns `None` once all
    /// work across every lane has been drained. In the final convergence
    /// phase (no empty lane left to bisect into, but work remains), the
    /// same integer may legally be handed to more than one caller — per
    /// spec §4.F callers of the Resizer's migration batch are already
    /// idempotent on the resulting unit of work.
    pub fn take(&self, lane: usize) -> Option<u32> {
        let lane = lane % self.lanes.len();
        loop {
            let cur = self.lanes[lane].load(Ordering::Acquire);
            if cur == UNASSIGNED {
                return self.help_largest();
            }
            let (start, end) = unpack(cur);
            if start >= end {
                if self.bisect_largest_into_empty() {
                    continue;
                }
                return self.help_largest();
            }
            let next = pack(start + 1, end);
            if self.lanes[lane]
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(start);
            }
            // another thread mutated this lane concurrently (a split
            // published into it, or — in the final phase — a peer helping
            // out); reload and retry
        }
    }

    /// Finds the currently-largest live range and bisects its upper half
    /// into the first empty lane. Returns `true` if a split was published.
    fn bisect_largest_into_empty(&self) -> bool {
        let mut empty_idx = None;
        let mut best_idx = None;
        let mut best_len = 0u64;
        for (i, lane) in self.lanes.iter().enumerate() {
            let v = lane.load(Ordering::Acquire);
            if v == UNASSIGNED {
                if empty_idx.is_none() {
                    empty_idx = Some(i);
                }
                continue;
            }
            let (s, e) = unpack(v);
            let len = e.saturating_sub(s) as u64;
            if len > best_len {
                best_len = len;
                best_idx = Some(i);
            }
        }
        let (Some(ei), Some(bi)) = (empty_idx, best_idx) else {
            return false;
        };
        if best_len < 2 {
            return false;
        }
        let cur = self.lanes[bi].load(Ordering::Acquire);
        let (s, e) = unpack(cur);
        if e <= s {
            return false;
        }
        let mid = s + (e - s) / 2;
        let lower = pack(s, mid);
        let upper = pack(mid, e);
        if self.lanes[bi]
            .compare_exchange(cur, lower, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.lanes[ei].store(upper, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Final phase (spec §4.F): no empty lane remains to split into, but
    /// some lane still has work. Every idle worker converges on the
    /// largest surviving lane and may observe the same head value as its
    /// peers.
    fn help_largest(&self) -> Option<u32> {
        let mut best_idx = None;
        let mut best_len = 0i64;
        for (i, lane) in self.lanes.iter().enumerate() {
            let v = lane.load(Ordering::Acquire);
            if v == UNASSIGNED {
                continue;
            }
            let (s, e) = unpack(v);
            let len = e as i64 - s as i64;
            if len > best_len {
                best_len = len;
                best_idx = Some(i);
            }
        }
        let bi = best_idx?;
        if best_len <= 0 {
            return None;
        }
        let (s, _e) = unpack(self.lanes[bi].load(Ordering::Acquire));
        Some(s)
    }

    /// True once every lane is either unassigned or empty.
    pub fn is_drained(&self) -> bool {
        self.lanes.iter().all(|l| {
            let v = l.load(Ordering::Acquire);
            v == UNASSIGNED || unpack(v).0 >= unpack(v).1
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_lane_drains_whole_range() {
        let s = RangeSplitter::new(0, 100, 1);
        let mut seen = HashSet::new();
        while let Some(v) = s.take(0) {
            assert!(seen.insert(v), "value {v} handed out twice in single-lane mode");
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn idle_lanes_steal_from_busy_one() {
        let s = Arc::new(RangeSplitter::new(0, 10_000, 8));
        let threads: Vec<_> = (0..8)
            .map(|lane| {
                let s = s.clone();
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(v) = s.take(lane) {
                        mine.push(v);
                    }
                    mine
                })
            })
            .collect();
        let mut all: Vec<u32> = threads.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 10_000, "every unit of work must be produced at least once");
        assert_eq!(all[0], 0);
        assert_eq!(*all.last().unwrap(), 9_999);
    }

    #[test]
    fn empty_range_yields_nothing() {
        let s = RangeSplitter::new(5, 5, 4);
        assert_eq!(s.take(0), None);
        assert!(s.is_drained());
    }
}
