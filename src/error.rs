//! Construction-time failure modes. Every other error mode in the core is a
//! design-time invariant resolved by internal retry; nothing else is surfaced
//! to callers (see `DESIGN.md`, §7).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
/// Errors raised while constructing a table
pub enum TableError {
    /// the requested table size is zero, not a power of two, or exceeds 2^30 slots
    CapacityExceeded,
}

pub type TableResult<T> = Result<T, TableError>;
