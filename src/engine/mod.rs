//! Copy execution pipeline.
//!
//! One `SourceTrade` fans out to every eligible follower; each follower
//! runs the pipeline independently under a per-follower lock:
//! resolve settings, size, gate, sync balances, sign and submit.

mod gate;
mod locks;
mod orchestrator;
mod resolver;
mod retry;
mod sizer;
mod submitter;
mod sync;
#[cfg(test)]
mod testutil;

pub use orchestrator::{FollowerOutcome, Orchestrator, TradeReport};
