//! Engine configuration, loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// CLOB API base URL (Polygon mainnet).
pub const DEFAULT_CLOB_URL: &str = "https://clob.polymarket.com";
/// Public Polygon RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
/// Bridged USDC (USDC.e) on Polygon, 6 decimals.
pub const USDC_BRIDGED: &str = "0x2791bca1f2de4661ed88a30c99a7a9449aa84174";
/// Native USDC on Polygon, 6 decimals.
pub const USDC_NATIVE: &str = "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359";

/// Retry policy bounds for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(250),
            max_elapsed: Duration::from_secs(8),
        }
    }
}

/// Balance synchronizer tuning.
///
/// The settle poll replaces the original fixed post-update sleep: the
/// exchange balance is re-read every `poll_interval` until it converges
/// with the chain or `poll_timeout` elapses.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Divergence below this is considered in sync (collateral units)
    pub balance_tolerance: Decimal,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: dec!(0.01),
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(10),
        }
    }
}

/// Order construction defaults.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// Buffer applied to the source price when pricing the copy order
    pub slippage_tolerance: Decimal,
    /// Order lifetime in seconds
    pub expiration_secs: u64,
    pub fee_rate_bps: u32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            slippage_tolerance: dec!(0.01),
            expiration_secs: 3600,
            fee_rate_bps: 0,
        }
    }
}

/// How incoming deposits are split between the operator gas leg and the
/// custodial collateral leg, with per-leg conversion slippage tolerances.
#[derive(Debug, Clone)]
pub struct FundingSplit {
    pub operator_bps: u32,
    pub custodial_bps: u32,
    /// Tolerance on the gas-token leg (fraction, e.g. 0.01 = 1%)
    pub gas_slippage: Decimal,
    /// Tolerance on the stablecoin leg
    pub stable_slippage: Decimal,
}

impl Default for FundingSplit {
    fn default() -> Self {
        Self {
            operator_bps: 500,
            custodial_bps: 9500,
            gas_slippage: dec!(0.01),
            stable_slippage: dec!(0.001),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Process-wide master secret for operator key derivation
    pub master_secret: String,
    pub chain_id: u64,
    pub clob_url: String,
    pub rpc_url: String,
    pub usdc_bridged: String,
    pub usdc_native: String,
    /// Withdrawal-authorization module; when set, the derived operator is
    /// preflight-checked against `isAuthorized(custodial, operator)`
    pub safe_module: Option<String>,
    pub database_url: String,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub order: OrderConfig,
    pub funding: FundingSplit,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `COPYDESK_MASTER_SECRET`. Everything else has mainnet
    /// defaults.
    pub fn from_env() -> Result<Self> {
        let master_secret = std::env::var("COPYDESK_MASTER_SECRET")
            .context("COPYDESK_MASTER_SECRET not set")?;

        let chain_id: u64 = env_or("COPYDESK_CHAIN_ID", "137")
            .parse()
            .context("Invalid COPYDESK_CHAIN_ID")?;

        let mut sync = SyncConfig::default();
        if let Ok(ms) = std::env::var("COPYDESK_SETTLE_POLL_MS") {
            sync.poll_interval = Duration::from_millis(ms.parse().context("Invalid COPYDESK_SETTLE_POLL_MS")?);
        }
        if let Ok(ms) = std::env::var("COPYDESK_SETTLE_TIMEOUT_MS") {
            sync.poll_timeout = Duration::from_millis(ms.parse().context("Invalid COPYDESK_SETTLE_TIMEOUT_MS")?);
        }
        if let Ok(tol) = std::env::var("COPYDESK_BALANCE_TOLERANCE") {
            sync.balance_tolerance =
                Decimal::from_str(&tol).context("Invalid COPYDESK_BALANCE_TOLERANCE")?;
        }

        Ok(Self {
            master_secret,
            chain_id,
            clob_url: env_or("COPYDESK_CLOB_URL", DEFAULT_CLOB_URL),
            rpc_url: env_or("COPYDESK_RPC_URL", DEFAULT_RPC_URL),
            usdc_bridged: env_or("COPYDESK_USDC_BRIDGED", USDC_BRIDGED),
            usdc_native: env_or("COPYDESK_USDC_NATIVE", USDC_NATIVE),
            safe_module: std::env::var("COPYDESK_SAFE_MODULE").ok(),
            database_url: env_or("COPYDESK_DATABASE_URL", "sqlite:./copydesk.db?mode=rwc"),
            retry: RetryConfig::default(),
            sync,
            order: OrderConfig::default(),
            funding: FundingSplit::default(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
