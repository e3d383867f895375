//! Deterministic in-memory "paper" registries.
//!
//! Design decisions (kept simple and deterministic):
//! - Transaction handles are derived from a per-registry sequence number:
//!   the first submit gets `0x…01`, the second `0x…02`, and so on.
//! - Block numbers advance by one per included write, starting at 1.
//! - No randomness. No wall-clock timestamps.
//! - Every call is counted so tests can assert "no network activity".
//! - A write is recorded when it is broadcast, not when it is prepared.
//!
//! Failure injection is per pair and sticky until changed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::B256;
use async_trait::async_trait;
use feeder_registry::{
    Confirmation, PreparedWrite, RegistryError, SourceRegistry, TargetRegistry, TargetWriter,
};
use feeder_schemas::{aggregator_round_id, Observation, Pair, Submission, TxHandle};

/// How a paper read behaves for a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadBehavior {
    #[default]
    Answer,
    /// Fail with `RegistryError::Transport`.
    TransportError,
    /// Never resolve. Only useful under a deadline.
    Hang,
}

/// How a paper broadcast behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BroadcastBehavior {
    #[default]
    Accept,
    /// The write reaches the node but the call never returns.
    Hang,
    /// Fail with `RegistryError::Transport` before the write reaches the node.
    TransportError,
}

/// How a paper write is confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConfirmBehavior {
    #[default]
    Include,
    Revert,
    Hang,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic in another test thread must not cascade into unrelated asserts.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Paper source feed: one "latest" observation per pair.
#[derive(Debug, Default)]
pub struct PaperSource {
    latest: Mutex<BTreeMap<Pair, Observation>>,
    behavior: Mutex<BTreeMap<Pair, ReadBehavior>>,
    calls: AtomicUsize,
}

impl PaperSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the latest observation for `pair`.
    pub fn set_latest(&self, pair: impl Into<Pair>, obs: Observation) {
        lock(&self.latest).insert(pair.into(), obs);
    }

    pub fn set_behavior(&self, pair: impl Into<Pair>, behavior: ReadBehavior) {
        lock(&self.behavior).insert(pair.into(), behavior);
    }

    /// Total `latest` calls across all pairs.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceRegistry for PaperSource {
    async fn latest(&self, pair: &Pair) -> Result<Observation, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.behavior).get(pair).copied().unwrap_or_default();
        match behavior {
            ReadBehavior::Answer => {}
            ReadBehavior::TransportError => {
                return Err(RegistryError::Transport(format!(
                    "paper source unreachable for {pair}"
                )))
            }
            ReadBehavior::Hang => std::future::pending::<()>().await,
        }
        lock(&self.latest)
            .get(pair)
            .copied()
            .ok_or_else(|| RegistryError::UnknownPair(pair.clone()))
    }
}

// ---------------------------------------------------------------------------
// Target aggregator (reader + writer)
// ---------------------------------------------------------------------------

/// A write recorded by [`PaperAggregator`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedWrite {
    pub pair: Pair,
    pub submission: Submission,
    pub handle: TxHandle,
}

#[derive(Debug, Default)]
struct AggregatorState {
    deployed: BTreeSet<Pair>,
    rounds: BTreeMap<Pair, BTreeMap<u64, Observation>>,
    writes: Vec<RecordedWrite>,
    /// Signed but not broadcast, keyed by handle.
    prepared: BTreeMap<TxHandle, RecordedWrite>,
    /// Broadcast but not yet confirmed, keyed by handle.
    pending: BTreeMap<TxHandle, RecordedWrite>,
    read_behavior: BTreeMap<Pair, ReadBehavior>,
    rejected: BTreeSet<Pair>,
    broadcast_behavior: BroadcastBehavior,
    confirm_behavior: ConfirmBehavior,
    seq: u64,
    block: u64,
}

/// Paper target aggregator. A submitted write becomes readable only after it
/// is confirmed with [`ConfirmBehavior::Include`].
#[derive(Debug, Default)]
pub struct PaperAggregator {
    state: Mutex<AggregatorState>,
    reads: AtomicUsize,
    prepares: AtomicUsize,
    broadcasts: AtomicUsize,
    confirms: AtomicUsize,
}

impl PaperAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an aggregator for `pair`. Undeployed pairs answer `UnknownPair`.
    pub fn deploy(&self, pair: impl Into<Pair>) {
        lock(&self.state).deployed.insert(pair.into());
    }

    /// Seed a stored round directly (bypasses the write path and its counters).
    pub fn seed_round(&self, pair: impl Into<Pair>, round_id: u64, obs: Observation) {
        let pair = pair.into();
        let mut st = lock(&self.state);
        st.deployed.insert(pair.clone());
        st.rounds.entry(pair).or_default().insert(round_id, obs);
    }

    pub fn set_read_behavior(&self, pair: impl Into<Pair>, behavior: ReadBehavior) {
        lock(&self.state).read_behavior.insert(pair.into(), behavior);
    }

    /// Make every prepare for `pair` fail with `RegistryError::Rejected`.
    pub fn reject_writes(&self, pair: impl Into<Pair>) {
        lock(&self.state).rejected.insert(pair.into());
    }

    pub fn set_broadcast_behavior(&self, behavior: BroadcastBehavior) {
        lock(&self.state).broadcast_behavior = behavior;
    }

    pub fn set_confirm_behavior(&self, behavior: ConfirmBehavior) {
        lock(&self.state).confirm_behavior = behavior;
    }

    pub fn stored(&self, pair: &Pair, round_id: u64) -> Option<Observation> {
        lock(&self.state)
            .rounds
            .get(pair)
            .and_then(|r| r.get(&round_id))
            .copied()
    }

    /// Every write that reached the node, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn confirms(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    /// Reads + prepares + broadcasts + confirms.
    pub fn calls(&self) -> usize {
        self.reads() + self.prepares() + self.broadcasts() + self.confirms()
    }

    /// Handle given to the `seq`-th prepared write (1-based).
    pub fn handle_for(seq: u64) -> TxHandle {
        TxHandle(B256::left_padding_from(&seq.to_be_bytes()))
    }
}

#[async_trait]
impl TargetRegistry for PaperAggregator {
    async fn at_round(
        &self,
        pair: &Pair,
        round_id: u64,
    ) -> Result<Option<Observation>, RegistryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let st = lock(&self.state);
            if !st.deployed.contains(pair) {
                return Err(RegistryError::UnknownPair(pair.clone()));
            }
            st.read_behavior.get(pair).copied().unwrap_or_default()
        };
        match behavior {
            ReadBehavior::Answer => Ok(self.stored(pair, round_id)),
            ReadBehavior::TransportError => Err(RegistryError::Transport(format!(
                "paper aggregator unreachable for {pair}"
            ))),
            ReadBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl TargetWriter for PaperAggregator {
    async fn prepare(
        &self,
        pair: &Pair,
        submission: &Submission,
    ) -> Result<PreparedWrite, RegistryError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        let mut st = lock(&self.state);
        if !st.deployed.contains(pair) {
            return Err(RegistryError::UnknownPair(pair.clone()));
        }
        if st.rejected.contains(pair) {
            return Err(RegistryError::Rejected(format!(
                "paper aggregator refused transmit for {pair}"
            )));
        }
        st.seq += 1;
        let write = RecordedWrite {
            pair: pair.clone(),
            submission: *submission,
            handle: Self::handle_for(st.seq),
        };
        st.prepared.insert(write.handle, write.clone());
        Ok(PreparedWrite {
            handle: write.handle,
            raw: write.handle.0.to_vec(),
        })
    }

    async fn broadcast(&self, prepared: &PreparedWrite) -> Result<(), RegistryError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let mut st = lock(&self.state);
            if st.broadcast_behavior == BroadcastBehavior::TransportError {
                return Err(RegistryError::Transport(format!(
                    "paper aggregator unreachable for {}",
                    prepared.handle
                )));
            }
            let write = st.prepared.remove(&prepared.handle).ok_or_else(|| {
                RegistryError::Rejected(format!("unknown transaction {}", prepared.handle))
            })?;
            st.writes.push(write.clone());
            st.pending.insert(write.handle, write);
            st.broadcast_behavior
        };
        if behavior == BroadcastBehavior::Hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn confirm(&self, handle: &TxHandle) -> Result<Confirmation, RegistryError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.state).confirm_behavior;
        if behavior == ConfirmBehavior::Hang {
            std::future::pending::<()>().await;
        }

        let mut st = lock(&self.state);
        let write = st
            .pending
            .remove(handle)
            .ok_or_else(|| RegistryError::Transport(format!("unknown transaction {handle}")))?;
        st.block += 1;
        let block_number = Some(st.block);

        if behavior == ConfirmBehavior::Revert {
            return Ok(Confirmation::Reverted { block_number });
        }

        let s = write.submission;
        let obs = Observation {
            round_id: s.round_id,
            value: s.value,
            started_at: s.started_at,
            updated_at: st.block,
            answered_in_round: s.round_id,
        };
        st.rounds
            .entry(write.pair)
            .or_default()
            .insert(aggregator_round_id(s.round_id), obs);
        Ok(Confirmation::Included { block_number })
    }
}
