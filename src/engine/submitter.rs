//! Order construction and submission.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::api::{Exchange, OrderPayload, OrderResponse};
use crate::config::{OrderConfig, RetryConfig};
use crate::errors::EngineError;
use crate::models::{ClobCredentials, SourceTrade, TradeSide};
use crate::signing::{OrderSpec, SigningService};

use super::retry::with_retries;

/// Builds the signed order for a sized copy trade and submits it.
pub struct OrderSubmitter {
    signing: Arc<SigningService>,
    config: OrderConfig,
    retry: RetryConfig,
}

impl OrderSubmitter {
    pub fn new(signing: Arc<SigningService>, config: OrderConfig, retry: RetryConfig) -> Self {
        Self {
            signing,
            config,
            retry,
        }
    }

    /// Limit price with the slippage buffer applied: a BUY pays up to the
    /// buffer above the source price, a SELL accepts down to it. Clamped
    /// inside the open (0, 1) band and rounded to the price tick.
    pub fn limit_price(&self, side: TradeSide, source_price: Decimal) -> Decimal {
        let buffered = match side {
            TradeSide::Buy => source_price * (Decimal::ONE + self.config.slippage_tolerance),
            TradeSide::Sell => source_price * (Decimal::ONE - self.config.slippage_tolerance),
        };
        buffered.round_dp(3).clamp(dec!(0.001), dec!(0.999))
    }

    /// Sign and submit one copy order. Transient transport failures retry
    /// the same signed payload, so a timeout whose order actually landed
    /// cannot double-fill under a fresh salt. The exchange client reports
    /// a rejection as `Submission`, tagged when the cause was insufficient
    /// balance so the caller can trigger a balance repair.
    pub async fn submit<X: Exchange + Sync>(
        &self,
        exchange: &X,
        follower_wallet: &str,
        creds: &ClobCredentials,
        trade: &SourceTrade,
        copy_size: Decimal,
    ) -> Result<OrderResponse, EngineError> {
        let spec = OrderSpec {
            token_id: trade.token_id(),
            side: trade.side,
            size: copy_size,
            price: self.limit_price(trade.side, trade.price),
            fee_rate_bps: self.config.fee_rate_bps,
            expiration_secs: self.config.expiration_secs,
        };

        let order = self
            .signing
            .sign_order(follower_wallet, &creds.custodial_wallet, &spec)?;
        let auth = self.signing.api_auth(follower_wallet, creds)?;
        let payload = OrderPayload {
            order,
            owner: creds.api_key.clone(),
            order_type: "FOK".to_string(),
        };

        let response = with_retries(&self.retry, "order_submission", || {
            exchange.submit_order(&auth, &payload)
        })
        .await?;
        info!(
            token = %spec.token_id,
            side = %trade.side.as_str(),
            size = %copy_size,
            price = %spec.price,
            order_id = ?response.order_id,
            "order accepted"
        );
        Ok(response)
    }
}
