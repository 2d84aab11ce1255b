//! Funding verification results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balances observed for one follower: gas token at the operator address,
/// collateral token at the custodial wallet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObservedBalances {
    pub operator_gas: Decimal,
    pub custodial_collateral: Decimal,
}

/// Outcome of comparing expected vs actual balances after a deposit split.
///
/// Transient: computed per verification call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingVerificationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub observed: ObservedBalances,
}

impl FundingVerificationResult {
    pub fn valid(observed: ObservedBalances) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            observed,
        }
    }
}
