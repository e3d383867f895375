//! feeder-reconcile
//!
//! Reconciliation engine and batch driver for the price feed relay.
//!
//! - One pair: read source latest, read target at the narrowed round, compare
//!   values exactly, write at most once, then wait for inclusion.
//! - Many pairs: strictly sequential, one writer session, failures isolated.
//!
//! No RPC code here. Registries come in as trait objects.

mod batch;
mod engine;
mod shutdown;
mod types;

pub use batch::{run_batch, BatchReport, PairReport, SchedulePolicy};
pub use engine::{target_read_fallback, Reconciler, WriteMode};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use types::*;
