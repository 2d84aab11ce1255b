//! Follower identity and exchange credentials.

use serde::{Deserialize, Serialize};

/// A user subscribed to copy one or more traders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follower {
    pub id: String,

    /// Primary wallet address (lowercase, 0x-prefixed). Input to operator
    /// key derivation, never used for signing itself.
    pub wallet_address: String,
}

/// Exchange API credentials bound to a follower's custodial wallet.
///
/// Treated as a capability token: loaded per operation and never logged.
/// The manual `Debug` impl keeps secret material out of log output.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClobCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,

    /// The custodial smart-contract wallet holding the follower's collateral
    pub custodial_wallet: String,
}

impl std::fmt::Debug for ClobCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("api_passphrase", &"<redacted>")
            .field("custodial_wallet", &self.custodial_wallet)
            .finish()
    }
}
