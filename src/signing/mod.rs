//! Key derivation and signing, behind one narrow interface.
//!
//! `SigningService` is the only component that ever holds private key
//! material. Everything else hands it a follower wallet address and gets
//! back signed artifacts: orders, balance attestations, API auth headers.

mod deriver;
mod order;

pub use deriver::OperatorWalletDeriver;
pub use order::{OrderSpec, CTF_EXCHANGE};

use std::str::FromStr;

use alloy_primitives::{keccak256, Address};
use alloy_signer::SignerSync;
use chrono::Utc;

use crate::api::{ApiAuth, BalanceAttestation, SignedOrder};
use crate::errors::EngineError;
use crate::models::ClobCredentials;

/// Signing facade for the whole engine.
pub struct SigningService {
    deriver: OperatorWalletDeriver,
    chain_id: u64,
    exchange: Address,
}

impl SigningService {
    pub fn new(master_secret: impl Into<String>, chain_id: u64) -> Self {
        Self {
            deriver: OperatorWalletDeriver::new(master_secret),
            chain_id,
            // Compile-time constant, parse cannot fail.
            exchange: Address::from_str(CTF_EXCHANGE).unwrap(),
        }
    }

    /// Operator address derived for a follower wallet.
    pub fn operator_address(&self, follower_wallet: &str) -> Result<Address, EngineError> {
        self.deriver.operator_address(follower_wallet)
    }

    /// Build and sign an exchange order funded by the follower's custodial
    /// wallet, signed with the derived operator key.
    pub fn sign_order(
        &self,
        follower_wallet: &str,
        custodial_wallet: &str,
        spec: &OrderSpec,
    ) -> Result<SignedOrder, EngineError> {
        let wallet = self.deriver.derive(follower_wallet)?;
        order::build_signed_order(&wallet, custodial_wallet, spec, self.chain_id, self.exchange)
    }

    /// Sign a balance/allowance attestation for the exchange backend,
    /// keyed by {operator, custodial wallet, chain id}.
    pub fn sign_balance_attestation(
        &self,
        follower_wallet: &str,
        custodial_wallet: &str,
        asset_type: &str,
    ) -> Result<BalanceAttestation, EngineError> {
        let wallet = self.deriver.derive(follower_wallet)?;
        let operator_address = format!("{:?}", wallet.address);
        let timestamp = Utc::now().timestamp().to_string();

        let message = format!(
            "copydesk/balance-allowance/v1:{}:{}:{}:{}:{}",
            operator_address, custodial_wallet, self.chain_id, asset_type, timestamp
        );
        let hash = keccak256(message.as_bytes());
        let signature = wallet
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| EngineError::Signature(e.to_string()))?;

        Ok(BalanceAttestation {
            operator_address,
            custodial_wallet: custodial_wallet.to_string(),
            chain_id: self.chain_id,
            asset_type: asset_type.to_string(),
            timestamp,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Produce timestamped auth material for one exchange request.
    pub fn api_auth(
        &self,
        follower_wallet: &str,
        creds: &ClobCredentials,
    ) -> Result<ApiAuth, EngineError> {
        let wallet = self.deriver.derive(follower_wallet)?;
        let operator_address = format!("{:?}", wallet.address);
        let timestamp = Utc::now().timestamp().to_string();

        let message = format!("{}:{}:{}", timestamp, creds.api_key, operator_address);
        let hash = keccak256(message.as_bytes());
        let signature = wallet
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| EngineError::Signature(e.to_string()))?;

        Ok(ApiAuth {
            operator_address,
            timestamp,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
            api_key: creds.api_key.clone(),
            api_passphrase: creds.api_passphrase.clone(),
        })
    }
}
