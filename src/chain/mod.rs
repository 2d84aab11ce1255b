//! On-chain reads over JSON-RPC (Polygon-class network).
//!
//! The engine needs three things from the chain: the operator address's
//! native-gas balance, the custodial wallet's collateral balance (two
//! 6-decimal stablecoin variants, summed), and the withdrawal-authorization
//! module's view of which operator is allowed to act for a custodial
//! wallet.

use std::time::Duration;

use anyhow::{Context, Result};
use alloy_primitives::{keccak256, U256};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::EngineError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Gas token decimals (POL/MATIC).
const GAS_DECIMALS: u32 = 18;
/// Stablecoin decimals (both USDC variants).
const COLLATERAL_DECIMALS: u32 = 6;

/// Chain reads the engine depends on; a trait for test doubles.
pub trait Chain {
    /// Native gas-token balance of an address.
    fn native_balance(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Decimal, EngineError>> + Send;

    /// Collateral balance of a custodial wallet: bridged + native
    /// stablecoin, in whole-token units.
    fn collateral_balance(
        &self,
        wallet: &str,
    ) -> impl std::future::Future<Output = Result<Decimal, EngineError>> + Send;

    /// Whether the authorization module recognizes `operator` as the
    /// authorized user for `custodial`. `Ok(true)` when no module is
    /// configured (local runs, tests).
    fn is_authorized(
        &self,
        custodial: &str,
        operator: &str,
    ) -> impl std::future::Future<Output = Result<bool, EngineError>> + Send;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC chain client.
pub struct RpcClient {
    http: Client,
    rpc_url: String,
    usdc_bridged: String,
    usdc_native: String,
    safe_module: Option<String>,
}

impl RpcClient {
    pub fn new(
        rpc_url: impl Into<String>,
        usdc_bridged: impl Into<String>,
        usdc_native: impl Into<String>,
        safe_module: Option<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            usdc_bridged: usdc_bridged.into(),
            usdc_native: usdc_native.into(),
            safe_module,
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<String, EngineError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self.http.post(&self.rpc_url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::Transient(format!(
                "rpc {} failed with status {}",
                method,
                resp.status()
            )));
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("rpc {} parse: {}", method, e)))?;

        if let Some(err) = parsed.error {
            // An error object means the node answered; reverts and bad
            // params will not get better on retry.
            return Err(EngineError::Validation(format!(
                "rpc {} error {}: {}",
                method, err.code, err.message
            )));
        }

        parsed
            .result
            .ok_or_else(|| EngineError::Transient(format!("rpc {} returned no result", method)))
    }

    async fn erc20_balance(&self, token: &str, holder: &str) -> Result<Decimal, EngineError> {
        let data = encode_call("balanceOf(address)", &[abi_address(holder)?]);
        let result = self
            .rpc_call("eth_call", json!([{"to": token, "data": data}, "latest"]))
            .await?;
        decimal_from_hex(&result, COLLATERAL_DECIMALS)
    }
}

impl Chain for RpcClient {
    async fn native_balance(&self, address: &str) -> Result<Decimal, EngineError> {
        let result = self
            .rpc_call("eth_getBalance", json!([address, "latest"]))
            .await?;
        decimal_from_hex(&result, GAS_DECIMALS)
    }

    async fn collateral_balance(&self, wallet: &str) -> Result<Decimal, EngineError> {
        let bridged = self.erc20_balance(&self.usdc_bridged, wallet).await?;
        let native = self.erc20_balance(&self.usdc_native, wallet).await?;
        debug!(wallet = %wallet, bridged = %bridged, native = %native, "On-chain collateral read");
        Ok(bridged + native)
    }

    async fn is_authorized(&self, custodial: &str, operator: &str) -> Result<bool, EngineError> {
        let Some(module) = &self.safe_module else {
            return Ok(true);
        };

        let data = encode_call(
            "isAuthorized(address,address)",
            &[abi_address(custodial)?, abi_address(operator)?],
        );
        let result = self
            .rpc_call("eth_call", json!([{"to": module, "data": data}, "latest"]))
            .await?;

        let word = U256::from_str_radix(result.trim_start_matches("0x"), 16)
            .map_err(|e| EngineError::Validation(format!("bad bool result {}: {}", result, e)))?;
        Ok(word == U256::from(1u8))
    }
}

/// Build eth_call data: 4-byte selector plus 32-byte-padded arguments.
/// Selectors are computed at runtime from the canonical signature, so a
/// typo is a wrong call rather than a silently wrong constant.
fn encode_call(signature: &str, args: &[[u8; 32]]) -> String {
    let selector = &keccak256(signature.as_bytes())[..4];
    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(selector);
    for arg in args {
        data.extend_from_slice(arg);
    }
    format!("0x{}", hex::encode(data))
}

fn abi_address(addr: &str) -> Result<[u8; 32], EngineError> {
    let raw = hex::decode(addr.trim_start_matches("0x"))
        .map_err(|e| EngineError::Validation(format!("bad address {}: {}", addr, e)))?;
    if raw.len() != 20 {
        return Err(EngineError::Validation(format!(
            "address must be 20 bytes: {}",
            addr
        )));
    }
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(&raw);
    Ok(buf)
}

/// Parse a hex quantity into a Decimal with the given token scale.
fn decimal_from_hex(hex_value: &str, decimals: u32) -> Result<Decimal, EngineError> {
    let raw = U256::from_str_radix(hex_value.trim_start_matches("0x"), 16)
        .map_err(|e| EngineError::Validation(format!("bad quantity {}: {}", hex_value, e)))?;
    let atomic = u128::try_from(raw)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(|| EngineError::Validation(format!("quantity out of range: {}", hex_value)))?;
    Decimal::try_from_i128_with_scale(atomic, decimals)
        .map_err(|e| EngineError::Validation(format!("quantity out of range: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn hex_quantities_scale_by_token_decimals() {
        // 100 USDC = 100_000_000 atomic = 0x5f5e100
        assert_eq!(decimal_from_hex("0x5f5e100", 6).unwrap(), dec!(100));
        // 2 gas tokens = 2e18 wei
        assert_eq!(
            decimal_from_hex("0x1bc16d674ec80000", 18).unwrap(),
            dec!(2)
        );
        assert_eq!(decimal_from_hex("0x0", 6).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn call_data_has_selector_and_padded_args() {
        let addr = "0x1111111111111111111111111111111111111111";
        let data = encode_call("balanceOf(address)", &[abi_address(addr).unwrap()]);

        // 0x + 4-byte selector + one 32-byte word
        assert_eq!(data.len(), 2 + 8 + 64);
        // balanceOf(address) selector is the well-known 70a08231
        assert!(data.starts_with("0x70a08231"));
        assert!(data.ends_with("1111111111111111111111111111111111111111"));
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(abi_address("0x123").is_err());
        assert!(abi_address("not-an-address").is_err());
    }
}
