//! Balance/allowance synchronization with the exchange backend.
//!
//! The exchange rejects orders against a stale internal balance, so before
//! submitting we compare its recorded collateral balance for the custodial
//! wallet against the chain and, on divergence, push a signed attestation
//! and poll until the backend converges or the settle timeout elapses.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::api::Exchange;
use crate::chain::Chain;
use crate::config::{RetryConfig, SyncConfig};
use crate::errors::EngineError;
use crate::models::ClobCredentials;
use crate::signing::SigningService;

use super::retry::with_retries;

pub struct BalanceSynchronizer {
    signing: Arc<SigningService>,
    sync: SyncConfig,
    retry: RetryConfig,
}

impl BalanceSynchronizer {
    pub fn new(signing: Arc<SigningService>, sync: SyncConfig, retry: RetryConfig) -> Self {
        Self {
            signing,
            sync,
            retry,
        }
    }

    /// Bring the exchange's recorded balance for the follower's custodial
    /// wallet in line with the chain, returning the freshest recorded
    /// balance in collateral units.
    pub async fn sync<X, C>(
        &self,
        exchange: &X,
        chain: &C,
        follower_wallet: &str,
        creds: &ClobCredentials,
    ) -> Result<Decimal, EngineError>
    where
        X: Exchange + Sync,
        C: Chain + Sync,
    {
        let onchain = with_retries(&self.retry, "chain_collateral", || {
            chain.collateral_balance(&creds.custodial_wallet)
        })
        .await?;

        let auth = self.signing.api_auth(follower_wallet, creds)?;
        let recorded = with_retries(&self.retry, "exchange_balance", || {
            exchange.collateral_balance(&auth, &creds.custodial_wallet)
        })
        .await?;

        if self.converged(onchain, recorded) {
            debug!(
                custodial = %creds.custodial_wallet,
                balance = %recorded,
                "exchange balance already in sync"
            );
            return Ok(recorded);
        }

        info!(
            custodial = %creds.custodial_wallet,
            onchain = %onchain,
            recorded = %recorded,
            "exchange balance diverged, pushing attestation"
        );

        let attestation =
            self.signing
                .sign_balance_attestation(follower_wallet, &creds.custodial_wallet, "COLLATERAL")?;
        with_retries(&self.retry, "balance_update", || {
            exchange.update_balance_allowance(&auth, &attestation)
        })
        .await?;

        // Settle loop: re-read until the backend catches up or the
        // timeout elapses. On timeout we return the last reading and let
        // the submission path surface any remaining staleness.
        let deadline = Instant::now() + self.sync.poll_timeout;
        let mut last = recorded;
        loop {
            sleep(self.sync.poll_interval).await;

            let auth = self.signing.api_auth(follower_wallet, creds)?;
            last = with_retries(&self.retry, "exchange_balance", || {
                exchange.collateral_balance(&auth, &creds.custodial_wallet)
            })
            .await?;

            if self.converged(onchain, last) {
                debug!(custodial = %creds.custodial_wallet, balance = %last, "exchange balance settled");
                return Ok(last);
            }
            if Instant::now() >= deadline {
                warn!(
                    custodial = %creds.custodial_wallet,
                    onchain = %onchain,
                    recorded = %last,
                    "balance did not settle within timeout, proceeding with last reading"
                );
                return Ok(last);
            }
        }
    }

    fn converged(&self, onchain: Decimal, recorded: Decimal) -> bool {
        (onchain - recorded).abs() <= self.sync.balance_tolerance
    }
}
