//! Exchange (CLOB) backend interface.

mod clob;
mod types;

pub use clob::ClobClient;
pub use types::{ApiAuth, BalanceAttestation, OrderPayload, OrderResponse, SignedOrder};

use rust_decimal::Decimal;

use crate::errors::EngineError;

/// Exchange backend operations the engine depends on.
///
/// A trait so the orchestrator and synchronizer can be exercised against
/// test doubles; `ClobClient` is the production implementation.
pub trait Exchange {
    /// Submit a signed balance/allowance attestation for a custodial wallet.
    fn update_balance_allowance(
        &self,
        auth: &ApiAuth,
        attestation: &BalanceAttestation,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Read the exchange's currently recorded collateral balance for a
    /// custodial wallet, in collateral units.
    fn collateral_balance(
        &self,
        auth: &ApiAuth,
        custodial_wallet: &str,
    ) -> impl std::future::Future<Output = Result<Decimal, EngineError>> + Send;

    /// Submit a signed order.
    fn submit_order(
        &self,
        auth: &ApiAuth,
        payload: &OrderPayload,
    ) -> impl std::future::Future<Output = Result<OrderResponse, EngineError>> + Send;
}
