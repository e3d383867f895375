//! Registry boundary for the relay.
//!
//! This crate defines **only** the three capabilities the reconciliation
//! engine consumes and the error type they share:
//!
//! - [`SourceRegistry`]: latest observation for a pair.
//! - [`TargetRegistry`]: observation at a given aggregator round, if any.
//! - [`TargetWriter`]: sign a write, broadcast it, then await its inclusion.
//!
//! No RPC code, no ABI code and no address tables live here. Implementations
//! resolve a [`Pair`] to whatever address they need and report
//! [`RegistryError::UnknownPair`] when they cannot.

use std::fmt;

use async_trait::async_trait;
use feeder_schemas::{Observation, Pair, Submission, TxHandle};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a registry implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No address is configured for this pair on this side.
    UnknownPair(Pair),
    /// Network or RPC failure; the call did not complete.
    Transport(String),
    /// The call completed but the payload does not fit the expected types.
    Decode(String),
    /// The node or contract refused the write, so it is not live
    /// (e.g. gas estimation reverted, or the node rejected the raw transaction).
    Rejected(String),
}

impl RegistryError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RegistryError::Transport(_))
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownPair(p) => write!(f, "unknown pair: {p}"),
            RegistryError::Transport(msg) => write!(f, "transport error: {msg}"),
            RegistryError::Decode(msg) => write!(f, "decode error: {msg}"),
            RegistryError::Rejected(msg) => write!(f, "write rejected: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Read-only view of the source chain's feed contracts.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// The most recent observation for `pair`.
    async fn latest(&self, pair: &Pair) -> Result<Observation, RegistryError>;
}

/// Point reads against the target chain's aggregator contracts.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// The observation stored at `round_id`, or `Ok(None)` when that round was
    /// never written. Absence is a result, not an error.
    async fn at_round(&self, pair: &Pair, round_id: u64)
        -> Result<Option<Observation>, RegistryError>;
}

/// How a submitted write ended up on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Included { block_number: Option<u64> },
    Reverted { block_number: Option<u64> },
}

/// A signed write that has not been broadcast yet.
///
/// The handle is fixed at signing time, so it is known before anything
/// reaches the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedWrite {
    pub handle: TxHandle,
    /// Encoded signed transaction. Opaque outside the writer that produced it.
    pub raw: Vec<u8>,
}

/// Authenticated writer session for the target chain.
///
/// A write goes through three calls so the caller holds a [`TxHandle`] before
/// the write can become live, and keeps it if a later wait is cut short.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Build and sign `transmit(round_id, value, started_at)` for the pair's
    /// aggregator. Nothing is sent.
    async fn prepare(&self, pair: &Pair, submission: &Submission)
        -> Result<PreparedWrite, RegistryError>;

    /// Hand a prepared write to the node. `Rejected` means the node refused
    /// it; any other error leaves its fate unknown.
    async fn broadcast(&self, write: &PreparedWrite) -> Result<(), RegistryError>;

    /// Block until `handle` is included with the configured depth.
    async fn confirm(&self, handle: &TxHandle) -> Result<Confirmation, RegistryError>;
}
