//! Batch driver: strictly sequential, one failure never stops the batch.

use std::sync::Arc;

use alloy_primitives::Address;
use feeder_config::{FeedRoute, FeedTable, RelaySettings};
use feeder_reconcile::*;
use feeder_schemas::{Observation, Pair, I256};
use feeder_testkit::{PaperAggregator, PaperSource, ReadBehavior};

fn obs(round_id: u128, value: i64) -> Observation {
    Observation {
        round_id,
        value: I256::try_from(value).unwrap(),
        started_at: 1_000,
        updated_at: 1_000,
        answered_in_round: round_id,
    }
}

fn three_pairs() -> Arc<FeedTable> {
    let routes = ["AAVE-USD", "BTC-USD", "ETH-USD"]
        .iter()
        .enumerate()
        .map(|(i, p)| {
            FeedRoute::new(
                *p,
                Some(Address::repeat_byte(i as u8 + 1)),
                Some(Address::repeat_byte(i as u8 + 0x41)),
            )
        })
        .collect();
    Arc::new(FeedTable::new(routes).unwrap())
}

fn pairs(feeds: &FeedTable) -> Vec<Pair> {
    feeds.pairs().cloned().collect()
}

#[tokio::test]
async fn second_source_failure_does_not_stop_first_and_third() {
    let feeds = three_pairs();
    let source = Arc::new(PaperSource::new());
    let agg = Arc::new(PaperAggregator::new());
    for (i, p) in ["AAVE-USD", "BTC-USD", "ETH-USD"].iter().enumerate() {
        source.set_latest(*p, obs(10 + i as u128, 100 + i as i64));
        agg.deploy(*p);
    }
    // First pair is already current; third needs a write.
    agg.seed_round("AAVE-USD", 10, obs(10, 100));
    source.set_behavior("BTC-USD", ReadBehavior::TransportError);

    let r = Reconciler::new(
        feeds.clone(),
        source.clone(),
        agg.clone(),
        WriteMode::Submit(agg.clone()),
        RelaySettings::default(),
    );
    let report = run_batch(&r, &pairs(&feeds), SchedulePolicy::Sequential).await;

    assert_eq!(report.pairs.len(), 3);
    assert_eq!(
        report.pairs.iter().map(|p| p.pair.as_str()).collect::<Vec<_>>(),
        vec!["AAVE-USD", "BTC-USD", "ETH-USD"]
    );
    assert!(matches!(
        report.pairs[0].result,
        Ok(ReconcileOutcome::AlreadyCurrent { .. })
    ));
    assert!(matches!(
        report.pairs[1].result,
        Err(RelayError::Transport {
            stage: Stage::SourceRead,
            ..
        })
    ));
    assert!(matches!(
        report.pairs[2].result,
        Ok(ReconcileOutcome::Relayed { .. })
    ));

    assert_eq!(report.failed(), 1);
    assert_eq!(report.already_current(), 1);
    assert_eq!(report.relayed(), 1);
    assert!(!report.is_clean());
    assert_eq!(source.calls(), 3);
    assert_eq!(agg.writes().len(), 1);
    assert_eq!(agg.writes()[0].pair, Pair::from("ETH-USD"));
}

#[tokio::test]
async fn ineligible_pairs_count_as_skipped_not_failed() {
    let feeds = Arc::new(
        FeedTable::new(vec![
            FeedRoute::new("ETH-USD", Some(Address::repeat_byte(1)), Some(Address::repeat_byte(2))),
            FeedRoute::new("LINK-USD", Some(Address::repeat_byte(3)), None),
        ])
        .unwrap(),
    );
    let source = Arc::new(PaperSource::new());
    let agg = Arc::new(PaperAggregator::new());
    source.set_latest("ETH-USD", obs(1, 5));
    agg.seed_round("ETH-USD", 1, obs(1, 5));

    let r = Reconciler::new(
        feeds.clone(),
        source,
        agg.clone(),
        WriteMode::Submit(agg.clone()),
        RelaySettings::default(),
    );
    let report = run_batch(&r, &pairs(&feeds), SchedulePolicy::default()).await;

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 0);
    assert!(report.is_clean());
    assert_eq!(
        report.summary(),
        "pairs=2 relayed=0 already_current=1 would_relay=0 skipped=1 cancelled=0 failed=0"
    );
    assert!(report.pairs[1].line().starts_with("LINK-USD NOT_ELIGIBLE"));
}

#[tokio::test]
async fn shutdown_before_start_cancels_every_pair_without_calls() {
    let feeds = three_pairs();
    let source = Arc::new(PaperSource::new());
    let agg = Arc::new(PaperAggregator::new());
    let (trigger, shutdown) = Shutdown::channel();

    let r = Reconciler::new(
        feeds.clone(),
        source.clone(),
        agg.clone(),
        WriteMode::Submit(agg.clone()),
        RelaySettings::default(),
    )
    .with_shutdown(shutdown);
    trigger.trigger();

    let report = run_batch(&r, &pairs(&feeds), SchedulePolicy::Sequential).await;
    assert_eq!(report.cancelled(), 3);
    assert_eq!(report.failed(), 0);
    assert_eq!(source.calls(), 0);
    assert_eq!(agg.calls(), 0);
}
