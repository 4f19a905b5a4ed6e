//! # Utility Functions
//!
//! Hex parsing, serde helpers and display formatting shared by the contracts and the CLI.

use crate::error::{ContractError, ContractResult};

/// Hex decoding utilities
pub mod hex_bytes {
    use super::*;

    /// Decode a hex string, tolerating a leading `0x` and surrounding whitespace
    pub fn decode(input: &str) -> ContractResult<Vec<u8>> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        hex::decode(trimmed).map_err(|e| ContractError::encoding(format!("Invalid hex: {}", e)))
    }

    /// Decode a hex string into exactly `N` bytes
    pub fn decode_array<const N: usize>(input: &str) -> ContractResult<[u8; N]> {
        let bytes = decode(input)?;
        <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
            ContractError::encoding(format!("Expected {} bytes, got {}", N, bytes.len()))
        })
    }
}

/// Serde adapter storing big integers as big-endian hex strings
pub mod serde_biguint {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(16))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.trim_start_matches("0x");
        BigUint::parse_bytes(s.as_bytes(), 16)
            .ok_or_else(|| D::Error::custom(format!("invalid hex integer: {}", s)))
    }
}

/// Serde adapter storing byte vectors as hex strings
pub mod serde_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)
    }
}

/// Amount formatting utilities
pub mod amount {
    /// Convert satoshis to BTC with 8 decimal places
    pub fn sats_to_btc(sats: u64) -> f64 {
        sats as f64 / 100_000_000.0
    }

    /// Format amount with both sats and BTC
    pub fn format_dual(sats: u64) -> String {
        format!("{} sats ({:.8} BTC)", sats, sats_to_btc(sats))
    }
}

/// Oracle price formatting
pub mod price {
    /// Render a fixed-point price using the decimal scale published by the oracle
    pub fn format_scaled(price: u128, decimals: u8) -> String {
        if decimals == 0 {
            return price.to_string();
        }
        let digits = format!("{:0>width$}", price, width = decimals as usize + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals as usize);
        format!("{}.{}", int_part, frac_part)
    }
}

/// Time utilities
pub mod time {
    use chrono::DateTime;

    /// Format a unix timestamp for display
    pub fn format_unix(timestamp: u64) -> String {
        i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| format!("{} (out of range)", timestamp))
    }
}
