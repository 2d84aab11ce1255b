//! Wire types for the CLOB exchange API.

use serde::{Deserialize, Serialize};

/// Authentication material for one exchange request, produced by the
/// signing service. Carries a header signature rather than any key.
#[derive(Debug, Clone)]
pub struct ApiAuth {
    /// Derived operator address acting for the follower
    pub operator_address: String,
    /// Unix timestamp the header signature covers
    pub timestamp: String,
    /// Operator signature over the auth message
    pub signature: String,
    pub api_key: String,
    pub api_passphrase: String,
}

/// Signed balance/allowance attestation informing the exchange of a
/// custodial wallet's on-chain collateral state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAttestation {
    pub operator_address: String,
    pub custodial_wallet: String,
    pub chain_id: u64,
    pub asset_type: String,
    pub timestamp: String,
    pub signature: String,
}

/// A fully signed order ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    /// Funding source: the follower's custodial wallet
    pub maker: String,
    /// Derived operator address that produced the signature
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: String,
}

/// Response from order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
}

/// Exchange-recorded balance for a custodial wallet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Collateral balance in atomic units (6 decimals)
    pub balance: String,
    #[serde(default)]
    pub allowance: String,
}
