//! Boundary validation of inbound trade events.
//!
//! The upstream stream delivers NDJSON records of observed trades. Nothing
//! past this module trusts the wire shape: sides become a closed enum,
//! prices must sit strictly inside (0, 1), sizes must be positive, and the
//! trader address is normalized to lowercase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::EngineError;
use crate::models::{SourceTrade, TradeSide};

/// Wire shape of one trade event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTradeEvent {
    proxy_wallet: String,
    condition_id: String,
    #[serde(default)]
    slug: String,
    outcome: String,
    outcome_index: u32,
    #[serde(default)]
    asset: Option<String>,
    side: String,
    price: Decimal,
    size: Decimal,
    transaction_hash: String,
    /// Milliseconds since the epoch
    timestamp: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "profileImage")]
    _profile_image: String,
}

/// Parse and validate one NDJSON line into a `SourceTrade`.
pub fn parse_event(line: &str) -> Result<SourceTrade, EngineError> {
    let raw: RawTradeEvent = serde_json::from_str(line)
        .map_err(|e| EngineError::Validation(format!("malformed trade event: {}", e)))?;

    let side = match raw.side.to_uppercase().as_str() {
        "BUY" => TradeSide::Buy,
        "SELL" => TradeSide::Sell,
        other => {
            return Err(EngineError::Validation(format!(
                "unknown trade side: {}",
                other
            )))
        }
    };

    if raw.price <= Decimal::ZERO || raw.price >= Decimal::ONE {
        return Err(EngineError::Validation(format!(
            "price {} outside (0, 1)",
            raw.price
        )));
    }
    if raw.size <= Decimal::ZERO {
        return Err(EngineError::Validation(format!(
            "non-positive trade size {}",
            raw.size
        )));
    }
    if !raw.transaction_hash.starts_with("0x") || raw.transaction_hash.len() < 3 {
        return Err(EngineError::Validation(format!(
            "malformed transaction hash: {}",
            raw.transaction_hash
        )));
    }
    if raw.proxy_wallet.is_empty() || raw.condition_id.is_empty() {
        return Err(EngineError::Validation(
            "missing trader or market identifier".to_string(),
        ));
    }

    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(raw.timestamp)
        .ok_or_else(|| EngineError::Validation(format!("bad timestamp: {}", raw.timestamp)))?;

    Ok(SourceTrade {
        trader_address: raw.proxy_wallet.to_lowercase(),
        market_id: raw.condition_id,
        market_slug: raw.slug,
        outcome: raw.outcome,
        outcome_index: raw.outcome_index,
        asset: raw.asset,
        side,
        price: raw.price,
        size: raw.size,
        transaction_hash: raw.transaction_hash,
        timestamp,
        title: raw.title,
        trader_name: raw.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "proxyWallet": "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa",
            "conditionId": "0xcond",
            "slug": "will-it-happen",
            "outcome": "Yes",
            "outcomeIndex": 0,
            "asset": "7000",
            "side": "BUY",
            "price": "0.42",
            "size": "150",
            "transactionHash": "0xdeadbeef",
            "timestamp": 1717010000123i64,
            "title": "Will it happen?",
            "name": "whale",
            "profileImage": "https://example.com/pfp.png"
        })
    }

    #[test]
    fn valid_event_parses_and_normalizes_the_trader_address() {
        let trade = parse_event(&sample().to_string()).unwrap();

        assert_eq!(
            trade.trader_address,
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.price, dec!(0.42));
        assert_eq!(trade.size, dec!(150));
        assert_eq!(trade.asset.as_deref(), Some("7000"));
        assert_eq!(trade.timestamp.timestamp_millis(), 1717010000123);
    }

    #[test]
    fn unknown_side_is_rejected() {
        let mut event = sample();
        event["side"] = "HOLD".into();
        assert!(matches!(
            parse_event(&event.to_string()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn out_of_band_prices_are_rejected() {
        for price in ["0", "1", "1.2", "-0.1"] {
            let mut event = sample();
            event["price"] = price.into();
            assert!(parse_event(&event.to_string()).is_err(), "price {}", price);
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut event = sample();
        event["size"] = "0".into();
        assert!(parse_event(&event.to_string()).is_err());
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let mut event = sample();
        event["transactionHash"] = "nothex".into();
        assert!(parse_event(&event.to_string()).is_err());
    }

    #[test]
    fn missing_asset_falls_back_to_composite_token_id() {
        let mut event = sample();
        event.as_object_mut().unwrap().remove("asset");
        let trade = parse_event(&event.to_string()).unwrap();
        assert_eq!(trade.token_id(), "0xcond:0");
    }

    #[test]
    fn garbage_line_is_a_validation_error() {
        assert!(matches!(
            parse_event("not json at all"),
            Err(EngineError::Validation(_))
        ));
    }
}
