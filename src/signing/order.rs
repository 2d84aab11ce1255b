//! Exchange order construction and EIP-712 signing.
//!
//! Orders are signed with the contract-wallet proxy scheme: the custodial
//! wallet is the order's `maker` (funding source) while the derived
//! operator key produces the signature as `signer`. The signature type is
//! part of the signed struct, so the two must agree.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{keccak256, Address, U256};
use alloy_signer::SignerSync;
use rust_decimal::Decimal;

use crate::api::SignedOrder;
use crate::errors::EngineError;
use crate::models::TradeSide;

use super::deriver::OperatorWallet;

/// CTF Exchange contract on Polygon, the EIP-712 verifying contract.
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// Public taker address for open orders.
const PUBLIC_TAKER: &str = "0x0000000000000000000000000000000000000000";

/// Collateral token decimals (USDC).
const COLLATERAL_DECIMALS: u32 = 6;

/// Contract-wallet (gnosis safe) signature type. Custodial wallets always
/// sign this way; EOA (0) and proxy (1) orders are not produced here.
pub const SIGNATURE_TYPE_GNOSIS_SAFE: u8 = 2;

/// Everything needed to build one order, decided upstream of signing.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    /// Outcome token being traded (decimal uint string)
    pub token_id: String,
    pub side: TradeSide,
    /// Size in shares
    pub size: Decimal,
    /// Limit price per share (0 to 1)
    pub price: Decimal,
    pub fee_rate_bps: u32,
    /// Seconds from now until the order expires
    pub expiration_secs: u64,
}

/// Build and sign an order on behalf of a custodial wallet.
pub(super) fn build_signed_order(
    wallet: &OperatorWallet,
    custodial_wallet: &str,
    spec: &OrderSpec,
    chain_id: u64,
    exchange: Address,
) -> Result<SignedOrder, EngineError> {
    if spec.size <= Decimal::ZERO {
        return Err(EngineError::Validation(format!(
            "order size must be positive, got {}",
            spec.size
        )));
    }
    if spec.price <= Decimal::ZERO || spec.price >= Decimal::ONE {
        return Err(EngineError::Validation(format!(
            "order price must be in (0, 1), got {}",
            spec.price
        )));
    }

    let maker = custodial_wallet.to_string();
    let signer_address = format!("{:?}", wallet.address);

    // BUY: maker pays collateral (size * price), receives shares.
    // SELL: maker gives shares, receives collateral.
    let shares = to_atomic(spec.size);
    let collateral = to_atomic(spec.size * spec.price);
    let (maker_amount, taker_amount) = match spec.side {
        TradeSide::Buy => (collateral, shares),
        TradeSide::Sell => (shares, collateral),
    };

    let salt = uuid::Uuid::new_v4().as_u128().to_string();
    let nonce = uuid::Uuid::new_v4().as_u128().to_string();
    let expiration = (SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| EngineError::Signature(e.to_string()))?
        .as_secs()
        + spec.expiration_secs)
        .to_string();
    let fee_rate_bps = spec.fee_rate_bps.to_string();

    let order_hash = compute_order_hash(
        &salt,
        &maker,
        &signer_address,
        PUBLIC_TAKER,
        &spec.token_id,
        &maker_amount,
        &taker_amount,
        &expiration,
        &nonce,
        &fee_rate_bps,
        spec.side.as_u8(),
        SIGNATURE_TYPE_GNOSIS_SAFE,
    )?;
    let domain_hash = compute_domain_separator(chain_id, exchange);

    // keccak256("\x19\x01" || domainSeparator || structHash)
    let mut message = Vec::with_capacity(2 + 32 + 32);
    message.extend_from_slice(&[0x19, 0x01]);
    message.extend_from_slice(&domain_hash);
    message.extend_from_slice(&order_hash);
    let final_hash = keccak256(&message);

    let signature = wallet
        .signer
        .sign_hash_sync(&final_hash)
        .map_err(|e| EngineError::Signature(e.to_string()))?;

    Ok(SignedOrder {
        salt,
        maker,
        signer: signer_address,
        taker: PUBLIC_TAKER.to_string(),
        token_id: spec.token_id.clone(),
        maker_amount,
        taker_amount,
        side: spec.side.as_str().to_string(),
        expiration,
        nonce,
        fee_rate_bps,
        signature_type: SIGNATURE_TYPE_GNOSIS_SAFE,
        signature: format!("0x{}", hex::encode(signature.as_bytes())),
    })
}

/// Compute the EIP-712 order struct hash.
#[allow(clippy::too_many_arguments)]
fn compute_order_hash(
    salt: &str,
    maker: &str,
    signer: &str,
    taker: &str,
    token_id: &str,
    maker_amount: &str,
    taker_amount: &str,
    expiration: &str,
    nonce: &str,
    fee_rate_bps: &str,
    side: u8,
    signature_type: u8,
) -> Result<[u8; 32], EngineError> {
    let type_hash = keccak256(
        b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)"
    );

    let mut encoded = Vec::with_capacity(13 * 32);
    encoded.extend_from_slice(type_hash.as_slice());
    encoded.extend_from_slice(&encode_uint256(salt)?);
    encoded.extend_from_slice(&encode_address(maker)?);
    encoded.extend_from_slice(&encode_address(signer)?);
    encoded.extend_from_slice(&encode_address(taker)?);
    encoded.extend_from_slice(&encode_uint256(token_id)?);
    encoded.extend_from_slice(&encode_uint256(maker_amount)?);
    encoded.extend_from_slice(&encode_uint256(taker_amount)?);
    encoded.extend_from_slice(&encode_uint256(expiration)?);
    encoded.extend_from_slice(&encode_uint256(nonce)?);
    encoded.extend_from_slice(&encode_uint256(fee_rate_bps)?);
    encoded.extend_from_slice(&encode_uint8(side));
    encoded.extend_from_slice(&encode_uint8(signature_type));

    Ok(keccak256(&encoded).0)
}

/// Compute the EIP-712 domain separator for the exchange contract.
fn compute_domain_separator(chain_id: u64, exchange: Address) -> [u8; 32] {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );
    let name_hash = keccak256(b"Polymarket CTF Exchange");
    let version_hash = keccak256(b"1");

    let mut encoded = Vec::with_capacity(5 * 32);
    encoded.extend_from_slice(type_hash.as_slice());
    encoded.extend_from_slice(name_hash.as_slice());
    encoded.extend_from_slice(version_hash.as_slice());
    encoded.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    let mut addr_buf = [0u8; 32];
    addr_buf[12..].copy_from_slice(exchange.as_slice());
    encoded.extend_from_slice(&addr_buf);

    keccak256(&encoded).0
}

/// Convert a share/collateral amount to 6-decimal atomic units, truncating
/// any sub-atomic remainder.
pub fn to_atomic(amount: Decimal) -> String {
    let scaled = amount * Decimal::from(10u64.pow(COLLATERAL_DECIMALS));
    scaled.trunc().to_string()
}

fn encode_address(addr: &str) -> Result<[u8; 32], EngineError> {
    let addr = Address::from_str(addr)
        .map_err(|e| EngineError::Signature(format!("bad address {}: {}", addr, e)))?;
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_slice());
    Ok(buf)
}

fn encode_uint256(value: &str) -> Result<[u8; 32], EngineError> {
    let n = U256::from_str(value)
        .map_err(|e| EngineError::Signature(format!("bad uint256 {}: {}", value, e)))?;
    Ok(n.to_be_bytes())
}

fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}
