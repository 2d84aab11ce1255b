//! Follower copy-configuration records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a follower's copy size is derived from the source trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizingStrategy {
    /// Copy size is a constant number of shares, regardless of source size.
    Fixed,
    /// Copy size is a percentage of the source size.
    Percentage,
    /// Copy size scaled by follower-budget / trader-budget ratio.
    Proportional,
}

impl SizingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingStrategy::Fixed => "FIXED",
            SizingStrategy::Percentage => "PERCENTAGE",
            SizingStrategy::Proportional => "PROPORTIONAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FIXED" => Some(Self::Fixed),
            "PERCENTAGE" => Some(Self::Percentage),
            "PROPORTIONAL" => Some(Self::Proportional),
            _ => None,
        }
    }
}

/// Copy settings for one follower.
///
/// `trader_address = None` marks the follower's global record; a record
/// with a trader address overrides the global one for that trader in its
/// entirety. There is no field-level merge between the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySettings {
    /// Follower this record belongs to
    pub follower_id: String,

    /// Trader the record applies to; None means all followed traders
    pub trader_address: Option<String>,

    /// Inactive records are ignored by resolution
    pub is_active: bool,

    /// Sizing strategy
    pub strategy: SizingStrategy,

    /// Strategy parameter: fixed share count, percentage, or follower budget
    pub strategy_value: Decimal,

    /// Cap on a single copy order's size (shares)
    pub max_position_size: Option<Decimal>,

    /// Cap on the follower's total open exposure (collateral units)
    pub max_total_exposure: Option<Decimal>,

    /// Minimum source trade size to copy (shares)
    pub min_trade_size: Option<Decimal>,

    /// Maximum source trade size to copy (shares)
    pub max_trade_size: Option<Decimal>,

    /// Minimum acceptable price (odds)
    pub min_odds: Option<Decimal>,

    /// Maximum acceptable price (odds)
    pub max_odds: Option<Decimal>,
}

impl CopySettings {
    /// A minimal active global record, useful as a test fixture base.
    pub fn global(follower_id: &str, strategy: SizingStrategy, value: Decimal) -> Self {
        Self {
            follower_id: follower_id.to_string(),
            trader_address: None,
            is_active: true,
            strategy,
            strategy_value: value,
            max_position_size: None,
            max_total_exposure: None,
            min_trade_size: None,
            max_trade_size: None,
            min_odds: None,
            max_odds: None,
        }
    }

    /// Trader-specific variant of [`CopySettings::global`].
    pub fn for_trader(
        follower_id: &str,
        trader: &str,
        strategy: SizingStrategy,
        value: Decimal,
    ) -> Self {
        Self {
            trader_address: Some(trader.to_string()),
            ..Self::global(follower_id, strategy, value)
        }
    }
}
