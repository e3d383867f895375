use std::fmt;

use feeder_registry::RegistryError;
use feeder_schemas::{Pair, Submission, TxHandle, I256};

/// The external call an error came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    SourceRead,
    TargetRead,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::SourceRead => "source_read",
            Stage::TargetRead => "target_read",
            Stage::Submit => "submit",
        })
    }
}

/// Successful end states of one reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The target already holds the source value at the derived round. No write.
    AlreadyCurrent { round_id: u64, value: I256 },
    /// One write was submitted and included.
    Relayed {
        handle: TxHandle,
        submission: Submission,
        block_number: Option<u64>,
    },
    /// Dry run: a write would have been submitted.
    WouldRelay { round_id: u64, submission: Submission },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::AlreadyCurrent { .. } => "ALREADY_CURRENT",
            ReconcileOutcome::Relayed { .. } => "RELAYED",
            ReconcileOutcome::WouldRelay { .. } => "WOULD_RELAY",
        }
    }
}

/// Why a signed write was not observed as included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnconfirmedReason {
    /// The broadcast or the confirmation wait ran past its deadline.
    Timeout,
    Cancelled,
    Transport(String),
}

impl fmt::Display for UnconfirmedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnconfirmedReason::Timeout => f.write_str("deadline elapsed before inclusion"),
            UnconfirmedReason::Cancelled => f.write_str("shutdown requested"),
            UnconfirmedReason::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Everything that can stop one pair short of a terminal outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayError {
    /// Pair has no target address. Benign skip; no registry was called.
    NotEligible(Pair),
    /// Pair is not configured, or a registry does not know it.
    UnknownPair(Pair),
    Transport { stage: Stage, detail: String },
    /// A per-call deadline elapsed.
    Timeout { stage: Stage },
    /// An on-chain value does not fit the relay's types or the target ABI.
    Decode { stage: Stage, detail: String },
    /// The write was refused and is not live.
    Rejected(String),
    /// The write was included but failed.
    Reverted {
        handle: TxHandle,
        block_number: Option<u64>,
    },
    /// The write was signed and may be live, but inclusion was not observed.
    /// Not a success.
    Unconfirmed {
        handle: TxHandle,
        reason: UnconfirmedReason,
    },
    /// Shutdown was requested before the pair started.
    Cancelled,
}

impl RelayError {
    /// Map a registry error raised at `stage`.
    pub fn from_registry(stage: Stage, err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownPair(p) => RelayError::UnknownPair(p),
            RegistryError::Transport(detail) => RelayError::Transport { stage, detail },
            RegistryError::Decode(detail) => RelayError::Decode { stage, detail },
            RegistryError::Rejected(detail) => match stage {
                Stage::Submit => RelayError::Rejected(detail),
                _ => RelayError::Transport { stage, detail },
            },
        }
    }

    /// `NotEligible` is an expected skip, not a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, RelayError::NotEligible(_))
    }

    /// Counts against the run: neither benign nor a requested stop.
    pub fn is_failure(&self) -> bool {
        !matches!(self, RelayError::NotEligible(_) | RelayError::Cancelled)
    }

    /// Handle of a write that may have reached the chain, if any.
    pub fn handle(&self) -> Option<TxHandle> {
        match self {
            RelayError::Reverted { handle, .. } | RelayError::Unconfirmed { handle, .. } => {
                Some(*handle)
            }
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::NotEligible(_) => "NOT_ELIGIBLE",
            RelayError::UnknownPair(_) => "UNKNOWN_PAIR",
            RelayError::Transport { .. } => "TRANSPORT",
            RelayError::Timeout { .. } => "TIMEOUT",
            RelayError::Decode { .. } => "DECODE",
            RelayError::Rejected(_) => "REJECTED",
            RelayError::Reverted { .. } => "REVERTED",
            RelayError::Unconfirmed { .. } => "UNCONFIRMED",
            RelayError::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NotEligible(p) => write!(f, "{p} has no target aggregator; skipped"),
            RelayError::UnknownPair(p) => write!(f, "unknown pair: {p}"),
            RelayError::Transport { stage, detail } => {
                write!(f, "transport error during {stage}: {detail}")
            }
            RelayError::Timeout { stage } => write!(f, "deadline elapsed during {stage}"),
            RelayError::Decode { stage, detail } => {
                write!(f, "decode error during {stage}: {detail}")
            }
            RelayError::Rejected(detail) => write!(f, "write rejected: {detail}"),
            RelayError::Reverted {
                handle,
                block_number,
            } => match block_number {
                Some(b) => write!(f, "transaction {handle} reverted in block {b}"),
                None => write!(f, "transaction {handle} reverted"),
            },
            RelayError::Unconfirmed { handle, reason } => {
                write!(f, "transaction {handle} unconfirmed: {reason}")
            }
            RelayError::Cancelled => f.write_str("cancelled before start"),
        }
    }
}

impl std::error::Error for RelayError {}
