//! feeder-schemas
//!
//! Shared value types for the relay: pair identifiers, observations as read
//! from a feed registry, and the handle of a submitted write.
//!
//! Pure data. No IO.

use std::fmt;

pub use alloy_primitives::I256;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

mod round;

pub use round::{aggregator_round_id, AGGREGATOR_ROUND_MASK};

/// Identifier of a price feed, e.g. `"ETH-USD"`.
///
/// Opaque to the relay: it is only ever used as a lookup key into the feed
/// table and the registries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pair(String);

impl Pair {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pair {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Pair {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One recorded price data point.
///
/// Field widths follow the aggregator ABI: round ids are `uint80` (held in a
/// `u128`), timestamps fit in `u64`, and the answer is the feed's full
/// `int256` (8 decimals for the USD feeds).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub round_id: u128,
    pub value: I256,
    pub started_at: u64,
    pub updated_at: u64,
    /// Round in which `value` was finalized; may lag `round_id`.
    pub answered_in_round: u128,
}

impl Observation {
    /// Round id to use when querying the target aggregator for this observation.
    pub fn aggregator_round_id(&self) -> u64 {
        aggregator_round_id(self.round_id)
    }

    /// Exact value equality. No tolerance: one unit of difference is a mismatch.
    pub fn same_value(&self, other: &Observation) -> bool {
        self.value == other.value
    }
}

/// The fields forwarded to the target aggregator's `transmit`.
///
/// `updated_at` and `answered_in_round` are intentionally absent: the target
/// computes its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub round_id: u128,
    pub value: I256,
    pub started_at: u64,
}

impl From<&Observation> for Submission {
    fn from(o: &Observation) -> Self {
        Self {
            round_id: o.round_id,
            value: o.value,
            started_at: o.started_at,
        }
    }
}

/// Handle of a submitted target write (the transaction hash).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub B256);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
