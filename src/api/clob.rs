//! CLOB (Central Limit Order Book) client.
//!
//! Talks to the exchange backend's off-chain matching engine:
//! - balance/allowance attestation submission and balance reads
//! - order submission
//!
//! Every request carries operator-signed poly-* auth headers built from an
//! [`ApiAuth`] produced by the signing service.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;

use crate::errors::EngineError;

use super::types::{ApiAuth, BalanceAttestation, BalanceResponse, OrderPayload, OrderResponse};
use super::Exchange;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Production exchange client.
pub struct ClobClient {
    http: Client,
    base_url: String,
}

impl ClobClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Build authentication headers from pre-signed auth material.
    fn build_headers(&self, auth: &ApiAuth) -> Result<HeaderMap, EngineError> {
        let mut headers = HeaderMap::new();
        let pairs = [
            ("poly-address", auth.operator_address.as_str()),
            ("poly-signature", auth.signature.as_str()),
            ("poly-timestamp", auth.timestamp.as_str()),
            ("poly-api-key", auth.api_key.as_str()),
            ("poly-passphrase", auth.api_passphrase.as_str()),
        ];
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value)
                    .map_err(|e| EngineError::Validation(format!("bad header {}: {}", name, e)))?,
            );
        }
        Ok(headers)
    }

    /// Map a non-success response to the engine taxonomy. Auth failures
    /// are permanent; server-side and throttling failures are transient.
    fn classify_failure(operation: &str, status: StatusCode, body: String) -> EngineError {
        let message = format!("{}: {} - {}", operation, status, body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            EngineError::BalanceSync {
                message,
                retryable: false,
            }
        } else if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            EngineError::Transient(message)
        } else {
            EngineError::Validation(message)
        }
    }
}

impl Exchange for ClobClient {
    async fn update_balance_allowance(
        &self,
        auth: &ApiAuth,
        attestation: &BalanceAttestation,
    ) -> Result<(), EngineError> {
        let url = format!("{}/balance-allowance/update", self.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.build_headers(auth)?)
            .json(attestation)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_failure("balance-allowance update", status, body));
        }
        Ok(())
    }

    async fn collateral_balance(
        &self,
        auth: &ApiAuth,
        custodial_wallet: &str,
    ) -> Result<Decimal, EngineError> {
        let url = format!(
            "{}/balance-allowance?asset_type=COLLATERAL&signature_type=2&address={}",
            self.base_url, custodial_wallet
        );
        let resp = self
            .http
            .get(&url)
            .headers(self.build_headers(auth)?)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_failure("balance read", status, body));
        }

        let body: BalanceResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("balance parse: {}", e)))?;

        // Balance arrives in 6-decimal atomic units.
        let atomic = Decimal::from_str(&body.balance)
            .map_err(|e| EngineError::Validation(format!("bad balance {}: {}", body.balance, e)))?;
        Ok(atomic / Decimal::from(1_000_000u64))
    }

    async fn submit_order(
        &self,
        auth: &ApiAuth,
        payload: &OrderPayload,
    ) -> Result<OrderResponse, EngineError> {
        let url = format!("{}/order", self.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.build_headers(auth)?)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(EngineError::Transient(format!(
                    "order submission: {} - {}",
                    status, body
                )));
            }
            return Err(EngineError::Submission {
                insufficient_balance: is_balance_rejection(&body),
                message: format!("order submission: {} - {}", status, body),
            });
        }

        let response: OrderResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("order response parse: {}", e)))?;

        if !response.success {
            return Err(EngineError::Submission {
                insufficient_balance: is_balance_rejection(&response.error_msg),
                message: response.error_msg.clone(),
            });
        }
        Ok(response)
    }
}

/// The exchange phrases stale-ledger rejections a few different ways.
fn is_balance_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("insufficient") && (lower.contains("balance") || lower.contains("allowance"))
}
