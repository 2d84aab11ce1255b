//! Observed trade events from the exchange feed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Numeric encoding used by the exchange order struct.
    pub fn as_u8(&self) -> u8 {
        match self {
            TradeSide::Buy => 0,
            TradeSide::Sell => 1,
        }
    }
}

/// One observed trade by a monitored trader.
///
/// Immutable once received. `transaction_hash` is the idempotency key for
/// the whole copy pipeline: each (hash, follower) pair is executed at most
/// once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTrade {
    /// Trader's wallet address (lowercase, 0x-prefixed)
    pub trader_address: String,

    /// Market condition ID
    pub market_id: String,

    /// Market slug for display/lookup
    #[serde(default)]
    pub market_slug: String,

    /// Outcome label being traded (e.g., "Yes", "No")
    pub outcome: String,

    /// Outcome index within the market
    pub outcome_index: u32,

    /// Outcome token identifier when the feed carries one
    #[serde(default)]
    pub asset: Option<String>,

    /// Trade direction
    pub side: TradeSide,

    /// Price per share in collateral units (0.0 to 1.0, exclusive)
    pub price: Decimal,

    /// Number of shares traded
    pub size: Decimal,

    /// On-chain transaction hash
    pub transaction_hash: String,

    /// When the trade occurred
    pub timestamp: DateTime<Utc>,

    /// Market title (cosmetic, unused by engine decisions)
    #[serde(default)]
    pub title: String,

    /// Trader display name (cosmetic)
    #[serde(default)]
    pub trader_name: String,
}

impl SourceTrade {
    /// Outcome token the copy order trades. Falls back to a composite
    /// identifier when the feed omits the asset id.
    pub fn token_id(&self) -> String {
        match &self.asset {
            Some(asset) => asset.clone(),
            None => format!("{}:{}", self.market_id, self.outcome_index),
        }
    }
}
