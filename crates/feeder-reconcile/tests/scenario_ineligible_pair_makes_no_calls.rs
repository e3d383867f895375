//! A pair with a source feed but no target aggregator is skipped before any
//! registry is touched. A pair missing from the table fails fast, also
//! without calls.

use std::sync::Arc;

use alloy_primitives::Address;
use feeder_config::{FeedRoute, FeedTable, RelaySettings};
use feeder_reconcile::*;
use feeder_schemas::{Observation, Pair, I256};
use feeder_testkit::{PaperAggregator, PaperSource};

fn setup() -> (Reconciler, Arc<PaperSource>, Arc<PaperAggregator>) {
    let feeds = FeedTable::new(vec![FeedRoute::new(
        "LINK-USD",
        Some(Address::repeat_byte(0x11)),
        None,
    )])
    .unwrap();
    let source = Arc::new(PaperSource::new());
    let agg = Arc::new(PaperAggregator::new());
    source.set_latest(
        "LINK-USD",
        Observation {
            round_id: 1,
            value: I256::try_from(1_500_000_000i64).unwrap(),
            started_at: 1,
            updated_at: 1,
            answered_in_round: 1,
        },
    );
    let r = Reconciler::new(
        Arc::new(feeds),
        source.clone(),
        agg.clone(),
        WriteMode::Submit(agg.clone()),
        RelaySettings::default(),
    );
    (r, source, agg)
}

#[tokio::test]
async fn source_only_pair_is_not_eligible() {
    let (r, source, agg) = setup();
    let err = r.reconcile_pair(&Pair::from("LINK-USD")).await.unwrap_err();
    assert_eq!(err, RelayError::NotEligible(Pair::from("LINK-USD")));
    assert!(err.is_benign());
    assert_eq!(source.calls(), 0);
    assert_eq!(agg.calls(), 0);
}

#[tokio::test]
async fn unconfigured_pair_fails_fast() {
    let (r, source, agg) = setup();
    let err = r.reconcile_pair(&Pair::from("XYZ-USD")).await.unwrap_err();
    assert_eq!(err, RelayError::UnknownPair(Pair::from("XYZ-USD")));
    assert!(err.is_failure());
    assert_eq!(source.calls(), 0);
    assert_eq!(agg.calls(), 0);
}
