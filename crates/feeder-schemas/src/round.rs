//! Round-id narrowing between the source feed and the target aggregator.
//!
//! The source feed reports `uint80` round ids; the target aggregator is queried
//! with a 64-bit round id. The mapping keeps the low 64 bits and discards the
//! rest. It is lossy: two source rounds that differ only above bit 63 map to
//! the same aggregator round. The relay accepts this as a known limitation and
//! does not try to renumber or offset rounds.

/// Mask applied to a source round id to obtain the aggregator round id.
pub const AGGREGATOR_ROUND_MASK: u128 = u64::MAX as u128;

/// Source round id modulo 2^64.
pub fn aggregator_round_id(source_round_id: u128) -> u64 {
    (source_round_id & AGGREGATOR_ROUND_MASK) as u64
}
