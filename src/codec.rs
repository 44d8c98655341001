/*!
Component A — the packed slot-state codec.

Pure bit-packing over a single 64-bit word. No atomics, no side effects: a
[`SlotWord`] is a plain value type, copied freely, and the only thing that
ever touches a `Atomic<u64>` directly is `table.rs`. This separation mirrors
`idx::mtchm::meta`'s flag-bit helpers (`hf`/`cf`/`ldfl` in the teacher's
`mod.rs`), generalized from a tagged-pointer's low bits to a full 64-bit
packed word.

## Layout

```text
bit   63........34 33    32        31      30....b  b-1....0
field    head      used  resizing  removed  hash     next
```

`head`/`used`/`resizing`/`removed` sit at fixed bit positions regardless of
table size. `hash` and `next` split the low 31 bits at a point that depends
on `b = log2(capacity)`: `next` always needs exactly `b` bits to index a
table of `2^b` slots, so it gets the low `b` bits; `hash` gets whatever is
left (`31 - b` bits). Both field widths are therefore *derived from* `b`,
never fixed constants — every accessor that touches `hash` or `next` takes
`b` as a parameter.
*/

const HEAD_SHIFT: u32 = 34;
const HEAD_BITS: u32 = 30;
const HEAD_MASK: u64 = ((1u64 << HEAD_BITS) - 1) << HEAD_SHIFT;

const USED_BIT: u32 = 33;
const RESIZING_BIT: u32 = 32;
const REMOVED_BIT: u32 = 31;

/// Sentinel used by both `head` and `next`: 0 means "unwritten", 1 means
/// "end of chain" / "logically removed head". Any real index is stored as
/// `max(1, index)`.
pub const PTR_NONE: u32 = 0;
pub const PTR_END: u32 = 1;
/// Index of the first non-reserved slot; slots 0 and 1 are permanent sentinels.
pub const RESERVED_SLOTS: u32 = 2;

#[inline(always)]
pub const fn encode_ptr(index: u32) -> u32 {
    if index == 0 {
        PTR_END
    } else {
        index
    }
}

#[inline(always)]
const fn low_field_bits(b: u32) -> u32 {
    debug_assert!(b >= 1 && b <= HEAD_BITS);
    31 - b
}

#[inline(always)]
const fn next_mask(b: u32) -> u64 {
    (1u64 << b) - 1
}

#[inline(always)]
const fn hash_mask(b: u32) -> u64 {
    ((1u64 << low_field_bits(b)) - 1) << b
}

/// φ, the truncated-golden-ratio multiplicative hashing constant (spec
/// GLOSSARY). Spreads low-entropy keys (e.g. small sequential integers)
/// across the full 32-bit space before the top `b` bits are taken as the
/// bucket index.
pub const MIX_CONSTANT: u32 = 0x9e3779b9;

#[inline(always)]
pub const fn mix(hash: u32) -> u32 {
    hash.wrapping_mul(MIX_CONSTANT)
}

/// Splits a mixed 32-bit hash into a bucket index and a tag suitable for
/// [`SlotWord::with_hash`]. The bucket takes the top `b` bits; the tag
/// takes the next `31-b` bits (the field width the layout actually has
/// room for — one bit of the conceptual `32-b` remaining bits is not
/// retained, see the module doc comment).
#[inline(always)]
pub const fn split(mixed: u32, b: u32) -> (u32, u32) {
    let bucket = mixed >> (32 - b);
    let remaining = mixed & ((1u32 << (32 - b)) - 1);
    let tag = remaining >> 1;
    (bucket, tag)
}

/// Derives a migrated entry's bucket and tag in a larger table directly
/// from its old bucket and old tag, without reconstructing the original
/// mixed hash. Growing from `old_b` to `new_b` bits means each old bucket
/// splits into `2^(new_b-old_b)` children, selected by the top
/// `new_b-old_b` bits of the old tag field — exactly the bits the old
/// table's bucket index didn't have room to consume yet.
#[inline(always)]
pub const fn rehash_for_resize(old_bucket: u32, old_tag: u32, old_b: u32, new_b: u32) -> (u32, u32) {
    debug_assert!(new_b > old_b);
    let k = new_b - old_b;
    let old_tag_width = low_field_bits(old_b);
    let shift = old_tag_width - k;
    let new_bucket = (old_bucket << k) | (old_tag >> shift);
    let new_tag = old_tag & ((1u32 << shift) - 1);
    (new_bucket, new_tag)
}

/// A decoded view over one packed 64-bit slot word. Cheap to copy; never
/// itself atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWord(u64);

impl SlotWord {
    /// the all-zero word: an untouched slot, neither free nor claimed yet
    pub const UNWRITTEN: SlotWord = SlotWord(0);

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn head(self) -> u32 {
        ((self.0 & HEAD_MASK) >> HEAD_SHIFT) as u32
    }

    #[inline(always)]
    pub fn used(self) -> bool {
        self.0 & (1 << USED_BIT) != 0
    }

    #[inline(always)]
    pub fn resizing(self) -> bool {
        self.0 & (1 << RESIZING_BIT) != 0
    }

    #[inline(always)]
    pub fn removed(self) -> bool {
        self.0 & (1 << REMOVED_BIT) != 0
    }

    #[inline(always)]
    pub fn hash(self, b: u32) -> u32 {
        ((self.0 & hash_mask(b)) >> b) as u32
    }

    #[inline(always)]
    pub fn next(self, b: u32) -> u32 {
        (self.0 & next_mask(b)) as u32
    }

    #[inline(always)]
    pub fn with_head(self, head: u32) -> Self {
        debug_assert!(head < (1 << HEAD_BITS));
        Self((self.0 & !HEAD_MASK) | ((head as u64) << HEAD_SHIFT))
    }

    #[inline(always)]
    pub fn with_used(self, flag: bool) -> Self {
        Self(set_bit(self.0, USED_BIT, flag))
    }

    #[inline(always)]
    pub fn with_resizing(self, flag: bool) -> Self {
        Self(set_bit(self.0, RESIZING_BIT, flag))
    }

    #[inline(always)]
    pub fn with_removed(self, flag: bool) -> Self {
        Self(set_bit(self.0, REMOVED_BIT, flag))
    }

    #[inline(always)]
    pub fn with_hash(self, hash: u32, b: u32) -> Self {
        debug_assert!((hash as u64) < (1u64 << low_field_bits(b)));
        Self((self.0 & !hash_mask(b)) | ((hash as u64) << b))
    }

    #[inline(always)]
    pub fn with_next(self, next: u32, b: u32) -> Self {
        debug_assert!((next as u64) < (1u64 << b));
        Self((self.0 & !next_mask(b)) | (next as u64))
    }

    /// A slot is free for the Allocator iff it has never been claimed as an
    /// entry body (`used=0`), was never recycled through a removal
    /// (`removed=0`), and is not itself the active head of a bucket
    /// (`head=0`) — spec §3 invariants.
    #[inline(always)]
    pub fn is_free(self) -> bool {
        !self.used() && !self.removed() && self.head() == 0
    }

    /// `used=0 ∧ next≠0`: the slot's body is retained so a reader holding a
    /// stale index can still follow `next` forward (spec §3).
    #[inline(always)]
    pub fn is_logically_removed(self, b: u32) -> bool {
        !self.used() && self.next(b) != 0
    }

    /// Builds the word for a freshly allocated entry body, preserving
    /// whatever `head` value the word already carried (a slot plays two
    /// roles at once: head-of-its-own-bucket and body-of-somebody-else's
    /// entry).
    #[inline(always)]
    pub fn claim_entry(self, hash: u32, next: u32, b: u32) -> Self {
        self.with_used(true)
            .with_removed(false)
            .with_hash(hash, b)
            .with_next(next, b)
    }

    /// Builds the word for a logically-removed entry: body retained,
    /// `used` cleared, `removed` set, `next` redirected to whatever it used
    /// to point to (or to a freshly-linked replacement).
    #[inline(always)]
    pub fn logically_remove(self, redirect_next: u32, b: u32) -> Self {
        self.with_used(false).with_removed(true).with_next(redirect_next, b)
    }

    /// Retires a claimed-but-never-linked reservation for
    /// `Updater::close()`. The slot is *not* returned to the free pool:
    /// `removed` is monotone once set (spec §5 ABA-safety), so a slot the
    /// Allocator ever claimed can never be handed out again, whether or not
    /// the reservation was ultimately linked into a chain.
    #[inline(always)]
    pub fn abandon_reservation(self) -> Self {
        self.with_used(false).with_removed(true)
    }
}

#[inline(always)]
const fn set_bit(word: u64, bit: u32, flag: bool) -> u64 {
    if flag {
        word | (1 << bit)
    } else {
        word & !(1 << bit)
    }
}
