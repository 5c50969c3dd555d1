//! Deterministic partition of the runnable scenarios across shards.

use uiscout_core::scenario::Shard;

/// The contiguous slice of `items` that belongs to `shard`.
///
/// Shard `c` of `t` gets indices `[n*(c-1)/t, n*c/t)`. Slices of all shards
/// of the same total tile the input exactly, and sizes differ by at most one.
pub fn shard<T>(items: &[T], shard: Shard) -> &[T] {
    let n = items.len();
    let current = shard.current() as usize;
    let total = shard.total() as usize;
    let start = n * (current - 1) / total;
    let end = n * current / total;
    &items[start..end]
}
