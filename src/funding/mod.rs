//! Funding verification.
//!
//! Incoming deposits are split between the operator's gas leg and the
//! custodial wallet's collateral leg by a basis-point ratio, with a
//! conversion slippage tolerance per leg. The verifier compares expected
//! post-conversion amounts against observed balances.

use rust_decimal::Decimal;

use crate::chain::Chain;
use crate::config::FundingSplit;
use crate::errors::EngineError;
use crate::models::{FundingVerificationResult, ObservedBalances};

/// Gas balances beyond this multiple of expected get a warning: deposits
/// are probably being routed to the wrong leg.
const EXCESS_GAS_MULTIPLE: u32 = 2;

pub struct FundingVerifier {
    split: FundingSplit,
}

impl FundingVerifier {
    pub fn new(split: FundingSplit) -> Self {
        Self { split }
    }

    /// Split a deposit into its (operator, custodial) legs, in deposit
    /// currency.
    pub fn expected_legs(&self, total_deposit: Decimal) -> (Decimal, Decimal) {
        let operator = total_deposit * Decimal::from(self.split.operator_bps) / Decimal::from(10_000u32);
        let custodial = total_deposit * Decimal::from(self.split.custodial_bps) / Decimal::from(10_000u32);
        (operator, custodial)
    }

    /// Compare expected per-leg amounts against observed balances.
    ///
    /// Shortfalls below the slippage-adjusted minimum are errors; a gas
    /// balance more than double the expected amount is a warning.
    pub fn verify(
        &self,
        expected_gas: Decimal,
        expected_collateral: Decimal,
        observed: ObservedBalances,
    ) -> FundingVerificationResult {
        let mut result = FundingVerificationResult::valid(observed);

        let min_gas = expected_gas * (Decimal::ONE - self.split.gas_slippage);
        if observed.operator_gas < min_gas {
            result.errors.push(format!(
                "operator gas balance {} below minimum {} (expected {})",
                observed.operator_gas, min_gas, expected_gas
            ));
        }

        let min_collateral = expected_collateral * (Decimal::ONE - self.split.stable_slippage);
        if observed.custodial_collateral < min_collateral {
            result.errors.push(format!(
                "custodial collateral balance {} below minimum {} (expected {})",
                observed.custodial_collateral, min_collateral, expected_collateral
            ));
        }

        if observed.operator_gas > expected_gas * Decimal::from(EXCESS_GAS_MULTIPLE) {
            result.warnings.push(format!(
                "operator gas balance {} exceeds double the expected {}",
                observed.operator_gas, expected_gas
            ));
        }

        result.is_valid = result.errors.is_empty();
        result
    }

    /// Read live balances for a follower's addresses and verify them.
    pub async fn verify_onchain<C: Chain>(
        &self,
        chain: &C,
        operator_address: &str,
        custodial_wallet: &str,
        expected_gas: Decimal,
        expected_collateral: Decimal,
    ) -> Result<FundingVerificationResult, EngineError> {
        let observed = ObservedBalances {
            operator_gas: chain.native_balance(operator_address).await?,
            custodial_collateral: chain.collateral_balance(custodial_wallet).await?,
        };
        Ok(self.verify(expected_gas, expected_collateral, observed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn verifier() -> FundingVerifier {
        FundingVerifier::new(FundingSplit::default())
    }

    fn observed(gas: Decimal, collateral: Decimal) -> ObservedBalances {
        ObservedBalances {
            operator_gas: gas,
            custodial_collateral: collateral,
        }
    }

    #[test]
    fn deposit_split_is_five_ninety_five() {
        let (operator, custodial) = verifier().expected_legs(dec!(1000));
        assert_eq!(operator, dec!(50));
        assert_eq!(custodial, dec!(950));
    }

    #[test]
    fn gas_shortfall_is_the_only_error() {
        let result = verifier().verify(dec!(2.0), dec!(100), observed(dec!(1.5), dec!(100)));

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("gas"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn excess_gas_is_a_warning_not_an_error() {
        let result = verifier().verify(dec!(2.0), dec!(100), observed(dec!(5.0), dec!(100)));

        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("double"));
    }

    #[test]
    fn balances_within_slippage_pass() {
        // 1% tolerance on gas, 0.1% on stable.
        let result = verifier().verify(dec!(2.0), dec!(100), observed(dec!(1.99), dec!(99.91)));

        assert!(result.is_valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn collateral_shortfall_beyond_slippage_fails() {
        let result = verifier().verify(dec!(2.0), dec!(100), observed(dec!(2.0), dec!(99.5)));

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("collateral"));
    }
}
