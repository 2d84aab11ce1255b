//! Follower position records, used for exposure accounting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeSide;

/// Whether a position is still held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

/// A follower's stake in one market outcome.
///
/// Mutated only by successful copy executions or manual closes; the risk
/// gate reads open positions to compute current exposure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Follower holding the position
    pub follower_id: String,

    /// Market condition ID
    pub market_id: String,

    /// Outcome held
    pub outcome: String,

    /// Side the position was opened on
    pub side: TradeSide,

    /// Number of shares held
    pub size: Decimal,

    /// Average entry price per share
    pub entry_price: Decimal,

    /// Current market value in collateral units
    pub current_value: Decimal,

    /// Open or closed
    pub status: PositionStatus,

    /// Trader whose trade opened this position, if copied
    pub source_trader: Option<String>,

    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Exposure this position contributes while open.
    pub fn exposure(&self) -> Decimal {
        match self.status {
            PositionStatus::Open => self.current_value,
            PositionStatus::Closed => Decimal::ZERO,
        }
    }
}
