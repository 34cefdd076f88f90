//! Deterministic partition hashing for aggregate ids.
//!
//! Every place that needs ordering-per-aggregate (processor lanes, bus
//! partitions) keys off the same 31-bit hash of the aggregate id, so a
//! given aggregate always lands in the same lane for a fixed lane count.

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET: u32 = 0x811c_9dc5;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash a string with the FNV-1a 32-bit algorithm.
pub fn fnv1a_32(s: &str) -> u32 {
    s.bytes()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME))
}

/// Fold an aggregate id into a non-negative 31-bit partition key.
///
/// The result is stable across calls and across process restarts; lane
/// assignment is `partition_hash(id) mod lane_count`.
pub fn partition_hash(aggregate_id: &str) -> i32 {
    i32::try_from(fnv1a_32(aggregate_id) & 0x7fff_ffff).unwrap_or(i32::MAX)
}
