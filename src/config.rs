/*!
Compile-time tuning knobs.

Mirrors `idx::mtchm::meta::{PreConfig, Config, DefConfig}` from the teacher
tree: rather than threading a runtime settings object through every hot-path
call, tunables live as associated `const`s on a zero-sized type, monomorphized
in. The spec (§9) explicitly flags these as "open questions...tuning knobs";
[`DefaultConfig`] pins the defaults the spec suggests, and a downstream crate
can supply its own [`TableConfig`] impl to retune without forking the
algorithm.
*/

/// Tunable constants governing allocation, resize triggers and migration
/// failover. All associated constants carry spec-suggested defaults so most
/// implementors only need `impl TableConfig for MyConfig {}`.
pub trait TableConfig: 'static {
    /// smallest table ever created (spec §3: "minimum 16")
    const MIN_SIZE: u32 = 16;
    /// largest table this implementation will ever grow to (spec §3: "maximum 2^30")
    const MAX_SIZE: u32 = 1 << 30;
    /// numerator of the probe-fail load factor (spec §4.B: "load factor ~ 15/16")
    const LOAD_FACTOR_NUM: u64 = 15;
    /// denominator of the probe-fail load factor
    const LOAD_FACTOR_DENOM: u64 = 16;
    /// length of the initial linear probe run before switching to triangular probing (spec §4.B: "first eight positions")
    const LINEAR_PROBE_RUN: u32 = 8;
    /// number of slots per migration batch handed out by the splitter (spec §4.E: "batches of 16 consecutive old-table slots")
    const MIGRATION_BATCH: u32 = 16;
    /// base unit for a resize helper's allocation failover timeout; actual timeout is this times the helper's arrival rank (spec §4.E: "~10s x arrival rank")
    const RESIZE_FAILOVER_BASE_MS: u64 = 10_000;
    /// maximum number of ranges the work-stealing splitter will bisect into (spec §4.F: "P <= 256")
    const SPLITTER_MAX_RANGES: usize = 256;
    /// number of shards in the size accumulator's striped counter
    const SIZE_SHARDS: usize = 16;

    #[inline(always)]
    fn probe_fail_threshold(capacity: u32) -> u64 {
        (capacity as u64 * Self::LOAD_FACTOR_NUM) / Self::LOAD_FACTOR_DENOM
    }
}

/// The default tuning: every constant is the spec's suggested value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;
impl TableConfig for DefaultConfig {}
