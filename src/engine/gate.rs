//! Risk and filter gate.
//!
//! Ordered checks that short-circuit on the first failure. A rejection
//! here is an expected outcome carried as a `FilterReason`, not an error.

use rust_decimal::Decimal;

use crate::errors::FilterReason;
use crate::models::{CopySettings, SourceTrade};

/// Validate a sized copy trade against the follower's limits.
///
/// `current_exposure` is the summed value of the follower's OPEN
/// positions; `copy_value` is the collateral the copy order would commit.
pub fn check_filters(
    trade: &SourceTrade,
    settings: &CopySettings,
    current_exposure: Decimal,
    copy_value: Decimal,
) -> Result<(), FilterReason> {
    if let Some(min) = settings.min_trade_size {
        if trade.size < min {
            return Err(FilterReason::TradeSizeBelowMin {
                size: trade.size,
                min,
            });
        }
    }
    if let Some(max) = settings.max_trade_size {
        if trade.size > max {
            return Err(FilterReason::TradeSizeAboveMax {
                size: trade.size,
                max,
            });
        }
    }

    if let Some(min) = settings.min_odds {
        if trade.price < min {
            return Err(FilterReason::OddsBelowMin {
                price: trade.price,
                min,
            });
        }
    }
    if let Some(max) = settings.max_odds {
        if trade.price > max {
            return Err(FilterReason::OddsAboveMax {
                price: trade.price,
                max,
            });
        }
    }

    if let Some(cap) = settings.max_total_exposure {
        if current_exposure + copy_value > cap {
            return Err(FilterReason::ExposureCapExceeded {
                current: current_exposure,
                copy_value,
                cap,
            });
        }
    }

    Ok(())
}
