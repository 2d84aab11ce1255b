//! Domain models for the copy execution engine.

mod follower;
mod funding;
mod position;
mod settings;
mod trade;

pub use follower::{ClobCredentials, Follower};
pub use funding::{FundingVerificationResult, ObservedBalances};
pub use position::{Position, PositionStatus};
pub use settings::{CopySettings, SizingStrategy};
pub use trade::{SourceTrade, TradeSide};
