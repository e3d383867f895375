use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use feeder_config::{FeedTable, RelaySettings};
use feeder_registry::{
    Confirmation, RegistryError, SourceRegistry, TargetRegistry, TargetWriter,
};
use feeder_schemas::{Observation, Pair, Submission, TxHandle};
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;
use crate::types::{ReconcileOutcome, RelayError, Stage, UnconfirmedReason};

/// What happens once the engine decides a write is needed.
#[derive(Clone)]
pub enum WriteMode {
    Submit(Arc<dyn TargetWriter>),
    /// Report [`ReconcileOutcome::WouldRelay`] instead of writing.
    DryRun,
}

/// Reconciles one pair at a time against a source and a target registry.
///
/// Holds no per-pair state: running it twice with an unchanged source is a
/// no-op the second time, because the write gate compares values already on
/// the target.
#[derive(Clone)]
pub struct Reconciler {
    feeds: Arc<FeedTable>,
    source: Arc<dyn SourceRegistry>,
    target: Arc<dyn TargetRegistry>,
    writes: WriteMode,
    settings: RelaySettings,
    shutdown: Shutdown,
}

impl Reconciler {
    pub fn new(
        feeds: Arc<FeedTable>,
        source: Arc<dyn SourceRegistry>,
        target: Arc<dyn TargetRegistry>,
        writes: WriteMode,
        settings: RelaySettings,
    ) -> Self {
        Self {
            feeds,
            source,
            target,
            writes,
            settings,
            shutdown: Shutdown::never(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Bring the target's copy of `pair` in line with the source's latest value.
    ///
    /// 1. Pair must have a target address (else `NotEligible`, no calls).
    /// 2. Read the source's latest observation.
    /// 3. Narrow its round id to the aggregator's 64-bit round.
    /// 4. Read the target at that round; a transport failure counts as absent.
    /// 5. Equal value on the target: `AlreadyCurrent`.
    /// 6. Otherwise sign `(round_id, value, started_at)` once, then broadcast it.
    /// 7. Wait for inclusion before reporting `Relayed`.
    ///
    /// Once the write is signed its handle is carried by every later error.
    pub async fn reconcile_pair(&self, pair: &Pair) -> Result<ReconcileOutcome, RelayError> {
        if self.shutdown.is_requested() {
            return Err(RelayError::Cancelled);
        }

        // 1) Eligibility. Decided from the table alone.
        let Some(route) = self.feeds.route(pair) else {
            return Err(RelayError::UnknownPair(pair.clone()));
        };
        if !route.is_eligible() {
            debug!(%pair, "no target aggregator configured; skipping");
            return Err(RelayError::NotEligible(pair.clone()));
        }

        // 2) Source
        let latest = self
            .bounded(Stage::SourceRead, self.source.latest(pair))
            .await?;
        // 3) Round derivation
        let round_id = latest.aggregator_round_id();
        debug!(
            %pair,
            source_round_id = %latest.round_id,
            round_id,
            value = %latest.value,
            "source observation"
        );

        // 4) Target at the derived round
        let current = match self
            .bounded(Stage::TargetRead, self.target.at_round(pair, round_id))
            .await
        {
            Ok(None) => {
                info!(%pair, round_id, "round not recorded on target");
                None
            }
            Ok(found) => found,
            Err(err) => target_read_fallback(pair, round_id, err)?,
        };

        // 5) Exact value comparison
        if let Some(current) = current {
            if current.same_value(&latest) {
                info!(%pair, round_id, value = %latest.value, "target already current");
                return Ok(ReconcileOutcome::AlreadyCurrent {
                    round_id,
                    value: latest.value,
                });
            }
            info!(
                %pair,
                round_id,
                source_value = %latest.value,
                target_value = %current.value,
                "target value differs"
            );
        }

        // 6) Write
        let submission = Submission::from(&latest);
        let writer = match &self.writes {
            WriteMode::DryRun => {
                info!(%pair, round_id, value = %submission.value, "dry run: would relay");
                return Ok(ReconcileOutcome::WouldRelay {
                    round_id,
                    submission,
                });
            }
            WriteMode::Submit(writer) => writer,
        };
        let prepared = self
            .bounded(Stage::Submit, writer.prepare(pair, &submission))
            .await?;
        let handle = prepared.handle;
        debug!(%pair, tx = %handle, "transmit signed");

        match tokio::time::timeout(self.settings.call_timeout, writer.broadcast(&prepared)).await {
            Ok(Ok(())) => {}
            Ok(Err(RegistryError::Rejected(detail))) => {
                warn!(%pair, tx = %handle, %detail, "node refused transmit");
                return Err(RelayError::Rejected(detail));
            }
            Ok(Err(err)) => {
                warn!(%pair, tx = %handle, error = %err, "broadcast failed; write may be live");
                return Err(RelayError::Unconfirmed {
                    handle,
                    reason: UnconfirmedReason::Transport(err.to_string()),
                });
            }
            Err(_) => {
                warn!(
                    %pair,
                    tx = %handle,
                    timeout_ms = duration_ms(self.settings.call_timeout),
                    "broadcast deadline elapsed; write may be live"
                );
                return Err(RelayError::Unconfirmed {
                    handle,
                    reason: UnconfirmedReason::Timeout,
                });
            }
        }
        info!(
            %pair,
            round_id = %submission.round_id,
            value = %submission.value,
            started_at = submission.started_at,
            tx = %handle,
            "transmit submitted"
        );

        // 7) Confirm
        self.confirm(pair, &**writer, handle, submission).await
    }

    async fn confirm(
        &self,
        pair: &Pair,
        writer: &dyn TargetWriter,
        handle: TxHandle,
        submission: Submission,
    ) -> Result<ReconcileOutcome, RelayError> {
        let mut shutdown = self.shutdown.clone();
        let waited = tokio::select! {
            biased;
            _ = shutdown.requested() => {
                warn!(%pair, tx = %handle, "shutdown while awaiting confirmation");
                return Err(RelayError::Unconfirmed {
                    handle,
                    reason: UnconfirmedReason::Cancelled,
                });
            }
            r = tokio::time::timeout(self.settings.confirm_timeout, writer.confirm(&handle)) => r,
        };

        match waited {
            Ok(Ok(Confirmation::Included { block_number })) => {
                info!(%pair, tx = %handle, block = ?block_number, "transmit confirmed");
                Ok(ReconcileOutcome::Relayed {
                    handle,
                    submission,
                    block_number,
                })
            }
            Ok(Ok(Confirmation::Reverted { block_number })) => {
                warn!(%pair, tx = %handle, block = ?block_number, "transmit reverted");
                Err(RelayError::Reverted {
                    handle,
                    block_number,
                })
            }
            Ok(Err(err)) => {
                warn!(%pair, tx = %handle, error = %err, "confirmation failed");
                Err(RelayError::Unconfirmed {
                    handle,
                    reason: UnconfirmedReason::Transport(err.to_string()),
                })
            }
            Err(_) => {
                warn!(
                    %pair,
                    tx = %handle,
                    timeout_ms = duration_ms(self.settings.confirm_timeout),
                    "confirmation deadline elapsed"
                );
                Err(RelayError::Unconfirmed {
                    handle,
                    reason: UnconfirmedReason::Timeout,
                })
            }
        }
    }

    async fn bounded<T>(
        &self,
        stage: Stage,
        call: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<T, RelayError> {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(r) => r.map_err(|e| RelayError::from_registry(stage, e)),
            Err(_) => Err(RelayError::Timeout { stage }),
        }
    }
}

/// Fallback rule: a target read that fails in transport, or runs past its
/// deadline, is treated as "round absent", which leads to a write.
///
/// Any other failure stays fatal for the pair.
pub fn target_read_fallback(
    pair: &Pair,
    round_id: u64,
    err: RelayError,
) -> Result<Option<Observation>, RelayError> {
    match err {
        RelayError::Transport { .. } | RelayError::Timeout { .. } => {
            warn!(
                %pair,
                round_id,
                error = %err,
                "target read failed; treating round as absent (fallback rule)"
            );
            Ok(None)
        }
        other => Err(other),
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_absorbs_transport_and_timeout_only() {
        let pair = Pair::from("ETH-USD");
        assert_eq!(
            target_read_fallback(
                &pair,
                5,
                RelayError::Transport {
                    stage: Stage::TargetRead,
                    detail: "reset".into()
                }
            ),
            Ok(None)
        );
        assert_eq!(
            target_read_fallback(
                &pair,
                5,
                RelayError::Timeout {
                    stage: Stage::TargetRead
                }
            ),
            Ok(None)
        );
        let decode = RelayError::Decode {
            stage: Stage::TargetRead,
            detail: "answer too wide".into(),
        };
        assert_eq!(
            target_read_fallback(&pair, 5, decode.clone()),
            Err(decode)
        );
        assert_eq!(
            target_read_fallback(&pair, 5, RelayError::UnknownPair(pair.clone())),
            Err(RelayError::UnknownPair(pair.clone()))
        );
    }
}
