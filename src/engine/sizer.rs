//! Copy-size computation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::EngineError;
use crate::models::{CopySettings, SizingStrategy};

/// Compute the copy size in shares for one trade.
///
/// `trader_bankroll` feeds the proportional strategy; when it is absent or
/// degenerate the strategy value is used as a fixed size instead.
/// Returns `SizingError` when the resolved size is not positive; callers
/// treat that as a skip.
pub fn compute_copy_size(
    settings: &CopySettings,
    source_size: Decimal,
    trader_bankroll: Option<Decimal>,
) -> Result<Decimal, EngineError> {
    let raw = match settings.strategy {
        SizingStrategy::Fixed => settings.strategy_value,
        SizingStrategy::Percentage => source_size * settings.strategy_value / dec!(100),
        SizingStrategy::Proportional => match trader_bankroll {
            Some(bankroll) if bankroll > Decimal::ZERO => {
                source_size * (settings.strategy_value / bankroll)
            }
            _ => settings.strategy_value,
        },
    };

    let sized = match settings.max_position_size {
        Some(cap) if raw > cap => cap,
        _ => raw,
    };

    if sized <= Decimal::ZERO {
        return Err(EngineError::Sizing(format!(
            "resolved copy size {} is not positive",
            sized
        )));
    }

    Ok(sized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(strategy: SizingStrategy, value: Decimal) -> CopySettings {
        CopySettings::global("alice", strategy, value)
    }

    #[test]
    fn fixed_ignores_source_size() {
        let s = settings(SizingStrategy::Fixed, dec!(25));
        assert_eq!(compute_copy_size(&s, dec!(1000), None).unwrap(), dec!(25));
        assert_eq!(compute_copy_size(&s, dec!(1), None).unwrap(), dec!(25));
    }

    #[test]
    fn percentage_scales_source_size() {
        let s = settings(SizingStrategy::Percentage, dec!(10));
        assert_eq!(compute_copy_size(&s, dec!(200), None).unwrap(), dec!(20));
    }

    #[test]
    fn proportional_scales_by_budget_ratio() {
        // Follower budget 1000 vs trader bankroll 50000: copy 2% of source.
        let s = settings(SizingStrategy::Proportional, dec!(1000));
        assert_eq!(
            compute_copy_size(&s, dec!(500), Some(dec!(50000))).unwrap(),
            dec!(10)
        );
    }

    #[test]
    fn proportional_without_bankroll_falls_back_to_fixed() {
        let s = settings(SizingStrategy::Proportional, dec!(15));
        assert_eq!(compute_copy_size(&s, dec!(500), None).unwrap(), dec!(15));
        assert_eq!(
            compute_copy_size(&s, dec!(500), Some(Decimal::ZERO)).unwrap(),
            dec!(15)
        );
    }

    #[test]
    fn result_is_clamped_to_max_position_size() {
        let mut s = settings(SizingStrategy::Percentage, dec!(50));
        s.max_position_size = Some(dec!(30));
        assert_eq!(compute_copy_size(&s, dec!(200), None).unwrap(), dec!(30));
    }

    #[test]
    fn non_positive_size_is_a_sizing_error() {
        let s = settings(SizingStrategy::Fixed, Decimal::ZERO);
        assert!(matches!(
            compute_copy_size(&s, dec!(100), None),
            Err(EngineError::Sizing(_))
        ));

        let s = settings(SizingStrategy::Percentage, dec!(10));
        assert!(matches!(
            compute_copy_size(&s, Decimal::ZERO, None),
            Err(EngineError::Sizing(_))
        ));
    }
}
