//! Deterministic operator-wallet derivation.
//!
//! Each follower gets a dedicated signing keypair derived from a
//! process-wide master secret and the follower's primary wallet address.
//! The derivation is one-way: a derived key reveals nothing about the
//! master secret, and the same follower address always maps to the same
//! keypair.

use alloy_primitives::{keccak256, Address};
use alloy_signer_local::PrivateKeySigner;

use crate::errors::EngineError;

/// Domain tag keeps derived keys disjoint from any other keccak use of the
/// same secret.
const DERIVATION_TAG: &[u8] = b"copydesk/operator-key/v1";

/// A derived signing keypair for one follower. The private key never
/// leaves the signing module; only the address is exposed.
pub(super) struct OperatorWallet {
    pub(super) address: Address,
    pub(super) signer: PrivateKeySigner,
}

/// Pure derivation function. Safe to call concurrently from any worker.
pub struct OperatorWalletDeriver {
    master_secret: String,
}

impl OperatorWalletDeriver {
    pub fn new(master_secret: impl Into<String>) -> Self {
        Self {
            master_secret: master_secret.into(),
        }
    }

    /// Derive the operator keypair for a follower's primary wallet.
    ///
    /// The address must be lowercase, 0x-prefixed, 40 hex characters.
    pub(super) fn derive(&self, follower_wallet: &str) -> Result<OperatorWallet, EngineError> {
        if self.master_secret.is_empty() {
            return Err(EngineError::Derivation("master secret is not set".into()));
        }
        validate_wallet_address(follower_wallet)?;

        // keccak output is uniform over 2^256; the probability of landing
        // outside the secp256k1 scalar range is ~2^-128, but the counter
        // keeps derivation total rather than panicking on that input.
        for counter in 0u8..=255 {
            let mut material =
                Vec::with_capacity(DERIVATION_TAG.len() + self.master_secret.len() + 64);
            material.extend_from_slice(DERIVATION_TAG);
            material.push(b':');
            material.extend_from_slice(self.master_secret.as_bytes());
            material.push(b':');
            material.extend_from_slice(follower_wallet.as_bytes());
            material.push(counter);

            let seed = keccak256(&material);
            if let Ok(signer) = PrivateKeySigner::from_bytes(&seed) {
                return Ok(OperatorWallet {
                    address: signer.address(),
                    signer,
                });
            }
        }

        Err(EngineError::Derivation(format!(
            "could not derive a valid key for {}",
            follower_wallet
        )))
    }

    /// Derived operator address for a follower wallet.
    pub fn operator_address(&self, follower_wallet: &str) -> Result<Address, EngineError> {
        Ok(self.derive(follower_wallet)?.address)
    }
}

/// Reject anything that is not a lowercase 0x-prefixed 20-byte hex address.
pub fn validate_wallet_address(addr: &str) -> Result<(), EngineError> {
    let hex_part = addr
        .strip_prefix("0x")
        .ok_or_else(|| EngineError::Derivation(format!("address missing 0x prefix: {}", addr)))?;

    if hex_part.len() != 40 {
        return Err(EngineError::Derivation(format!(
            "address must be 40 hex chars: {}",
            addr
        )));
    }
    if !hex_part
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(EngineError::Derivation(format!(
            "address must be lowercase hex: {}",
            addr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET_A: &str = "0x1111111111111111111111111111111111111111";
    const WALLET_B: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn derivation_is_deterministic() {
        let deriver = OperatorWalletDeriver::new("test-master-secret");

        let first = deriver.derive(WALLET_A).unwrap();
        let second = deriver.derive(WALLET_A).unwrap();
        assert_eq!(first.address, second.address);
    }

    #[test]
    fn distinct_wallets_yield_distinct_keys() {
        let deriver = OperatorWalletDeriver::new("test-master-secret");

        let a = deriver.derive(WALLET_A).unwrap();
        let b = deriver.derive(WALLET_B).unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn distinct_secrets_yield_distinct_keys() {
        let a = OperatorWalletDeriver::new("secret-one")
            .derive(WALLET_A)
            .unwrap();
        let b = OperatorWalletDeriver::new("secret-two")
            .derive(WALLET_A)
            .unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn empty_master_secret_fails() {
        let deriver = OperatorWalletDeriver::new("");
        assert!(matches!(
            deriver.derive(WALLET_A),
            Err(EngineError::Derivation(_))
        ));
    }

    #[test]
    fn malformed_addresses_fail() {
        let deriver = OperatorWalletDeriver::new("test-master-secret");

        for bad in [
            "1111111111111111111111111111111111111111",   // no prefix
            "0x111",                                      // too short
            "0x11111111111111111111111111111111111111ZZ", // non-hex
            "0x1111111111111111111111111111111111111اA",  // non-ascii
        ] {
            assert!(deriver.derive(bad).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn uppercase_addresses_are_rejected() {
        let deriver = OperatorWalletDeriver::new("test-master-secret");
        let upper = "0x1111111111111111111111111111111111111ABC";
        assert!(deriver.derive(upper).is_err());
    }
}
