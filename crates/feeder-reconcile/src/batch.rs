use feeder_schemas::Pair;
use tracing::{error, info, warn};

use crate::engine::Reconciler;
use crate::types::{ReconcileOutcome, RelayError};

/// How pairs in a batch are scheduled.
///
/// Only `Sequential` exists. All writes in a run are signed by one key, and
/// concurrent submits from one key would race on the account nonce. Do not add
/// a concurrent policy without nonce management in the writer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulePolicy {
    #[default]
    Sequential,
}

/// Result of one pair within a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairReport {
    pub pair: Pair,
    pub result: Result<ReconcileOutcome, RelayError>,
}

impl PairReport {
    /// One-line status, e.g. `ETH-USD RELAYED tx=0x…`.
    pub fn line(&self) -> String {
        match &self.result {
            Ok(ReconcileOutcome::AlreadyCurrent { round_id, value }) => {
                format!("{} ALREADY_CURRENT round={round_id} value={value}", self.pair)
            }
            Ok(ReconcileOutcome::Relayed {
                handle,
                submission,
                block_number,
            }) => {
                let block = block_number.map_or_else(|| "?".to_string(), |b| b.to_string());
                format!(
                    "{} RELAYED round={} value={} tx={handle} block={block}",
                    self.pair, submission.round_id, submission.value
                )
            }
            Ok(ReconcileOutcome::WouldRelay {
                round_id,
                submission,
            }) => format!(
                "{} WOULD_RELAY round={round_id} value={} started_at={}",
                self.pair, submission.value, submission.started_at
            ),
            Err(e) => format!("{} {} {e}", self.pair, e.code()),
        }
    }
}

/// Per-pair results in run order, plus counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub pairs: Vec<PairReport>,
}

impl BatchReport {
    fn count(&self, f: impl Fn(&Result<ReconcileOutcome, RelayError>) -> bool) -> usize {
        self.pairs.iter().filter(|p| f(&p.result)).count()
    }

    pub fn relayed(&self) -> usize {
        self.count(|r| matches!(r, Ok(ReconcileOutcome::Relayed { .. })))
    }

    pub fn already_current(&self) -> usize {
        self.count(|r| matches!(r, Ok(ReconcileOutcome::AlreadyCurrent { .. })))
    }

    pub fn would_relay(&self) -> usize {
        self.count(|r| matches!(r, Ok(ReconcileOutcome::WouldRelay { .. })))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, Err(e) if e.is_benign()))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|r| matches!(r, Err(RelayError::Cancelled)))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, Err(e) if e.is_failure()))
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "pairs={} relayed={} already_current={} would_relay={} skipped={} cancelled={} failed={}",
            self.pairs.len(),
            self.relayed(),
            self.already_current(),
            self.would_relay(),
            self.skipped(),
            self.cancelled(),
            self.failed()
        )
    }
}

/// Run the engine once per pair, in the given order.
///
/// A failure on one pair is logged and recorded; the batch always moves on
/// to the next pair. Once shutdown is requested, the remaining pairs are
/// recorded as `Cancelled` without touching any registry.
pub async fn run_batch(
    reconciler: &Reconciler,
    pairs: &[Pair],
    policy: SchedulePolicy,
) -> BatchReport {
    let mut report = BatchReport::default();
    match policy {
        SchedulePolicy::Sequential => {
            for pair in pairs {
                let result = reconciler.reconcile_pair(pair).await;
                log_result(pair, &result);
                report.pairs.push(PairReport {
                    pair: pair.clone(),
                    result,
                });
            }
        }
    }
    info!(summary = %report.summary(), "batch complete");
    report
}

fn log_result(pair: &Pair, result: &Result<ReconcileOutcome, RelayError>) {
    match result {
        Ok(outcome) => info!(%pair, outcome = outcome.label(), "pair done"),
        Err(e) if e.is_benign() => info!(%pair, code = e.code(), "pair skipped"),
        Err(RelayError::Cancelled) => warn!(%pair, "pair not started: shutdown requested"),
        Err(e) => error!(%pair, code = e.code(), error = %e, "pair failed"),
    }
}
