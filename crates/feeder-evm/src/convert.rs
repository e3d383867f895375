//! Conversions between aggregator ABI types and relay value types.
//!
//! Every narrowing is checked; a value that does not fit is a
//! [`RegistryError::Decode`], never a silent truncation. The one deliberate
//! truncation in the relay (source round id -> aggregator round id) lives in
//! `feeder_schemas::aggregator_round_id`, not here.

use alloy::primitives::{
    aliases::{I192, U192, U80},
    I256, U256,
};
use feeder_registry::RegistryError;
use feeder_schemas::{Observation, Submission};

/// The 5-tuple returned by `latestRoundData()` and `getRoundData(uint80)`.
pub(crate) struct RoundData {
    pub round_id: U80,
    pub answer: I256,
    pub started_at: U256,
    pub updated_at: U256,
    pub answered_in_round: U80,
}

pub(crate) fn observation_from_round_data(rd: RoundData) -> Result<Observation, RegistryError> {
    Ok(Observation {
        round_id: rd.round_id.to::<u128>(),
        value: rd.answer,
        started_at: u64_field(rd.started_at, "startedAt")?,
        updated_at: u64_field(rd.updated_at, "updatedAt")?,
        answered_in_round: rd.answered_in_round.to::<u128>(),
    })
}

fn u64_field(v: U256, field: &str) -> Result<u64, RegistryError> {
    if v > U256::from(u64::MAX) {
        return Err(RegistryError::Decode(format!("{field} {v} does not fit u64")));
    }
    Ok(v.to::<u64>())
}

fn int192(v: I256) -> Option<I192> {
    let (sign, abs) = v.into_sign_and_abs();
    let abs = U192::try_from_be_slice(&abs.to_be_bytes::<32>())?;
    I192::checked_from_sign_and_abs(sign, abs)
}

/// Arguments for `transmit(uint80 _roundId, int192 _answer, uint64 _timestamp)`.
pub(crate) fn transmit_args(s: &Submission) -> Result<(U80, I192, u64), RegistryError> {
    if s.round_id >> 80 != 0 {
        return Err(RegistryError::Decode(format!(
            "round id {} does not fit uint80",
            s.round_id
        )));
    }
    let answer = int192(s.value)
        .ok_or_else(|| RegistryError::Decode(format!("answer {} does not fit int192", s.value)))?;
    Ok((U80::from(s.round_id), answer, s.started_at))
}
