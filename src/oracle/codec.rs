//! # Oracle Message Codec
//!
//! Fixed-layout binary records published by the price oracle.
//!
//! ## Record Layout
//!
//! ```text
//! [0, 8)    timestamp      u64, little-endian
//! [8, 24)   price          u128, little-endian, fixed-point
//! [24]      decimals       scale of `price`, agreed out of band
//! [25]      reserved       zero
//! [26, 58)  symbol         32-byte asset pair identifier
//! ```
//!
//! Symbols are ASCII tags left-aligned in their 32 bytes and zero-padded on the
//! right (`BSV_USDC` is `42 53 56 5f 55 53 44 43` followed by 24 zero bytes).
//! The oracle pads the same way; the comparison covers all 32 bytes.
//!
//! The price is never rescaled here; the decimal byte is exposed through
//! [`decimal_scale`] for callers that want to render it.

use crate::config::oracle::*;
use crate::error::{ContractError, ContractResult};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 32-byte asset pair identifier, e.g. `BSV_USDC` zero-padded on the right
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol([u8; SYMBOL_LEN]);

impl Symbol {
    /// Build a symbol from an ASCII tag: left-aligned, zero bytes on the right.
    /// Tags longer than 32 bytes are truncated.
    pub fn from_tag(tag: &str) -> Self {
        let mut bytes = [0u8; SYMBOL_LEN];
        let len = tag.len().min(SYMBOL_LEN);
        bytes[..len].copy_from_slice(&tag.as_bytes()[..len]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SYMBOL_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SYMBOL_LEN] {
        &self.0
    }

    /// Tag without the trailing zero padding
    pub fn tag(&self) -> String {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }

    /// Printable ASCII followed only by zero padding, i.e. `from_tag(tag())` is lossless
    fn is_plain_tag(&self) -> bool {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        self.0[..end].iter().all(|b| b.is_ascii_graphic())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.tag())
    }
}

/// Plain tags are written as the tag itself, anything else as `0x` and the
/// 64 hex digits of the raw bytes. A tag never exceeds 32 bytes, so the two
/// forms cannot collide.
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_plain_tag() {
            serializer.serialize_str(&self.tag())
        } else {
            serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
        }
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.len() == SYMBOL_LEN * 2 + 2 {
            if let Some(digits) = text.strip_prefix("0x") {
                let mut bytes = [0u8; SYMBOL_LEN];
                hex::decode_to_slice(digits, &mut bytes).map_err(D::Error::custom)?;
                return Ok(Symbol(bytes));
            }
        }
        if text.len() > SYMBOL_LEN || !text.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(D::Error::custom(format!(
                "symbol must be up to {} printable ASCII bytes or 0x-prefixed hex: {:?}",
                SYMBOL_LEN, text
            )));
        }
        Ok(Symbol::from_tag(&text))
    }
}

/// Decoded oracle payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Unix timestamp the price was observed at
    pub timestamp: u64,
    /// Fixed-point price, scale carried out of band
    pub price: u128,
    /// Asset pair the price refers to
    pub symbol: Symbol,
}

fn check_len(message: &[u8]) -> ContractResult<()> {
    if message.len() < MESSAGE_LEN {
        return Err(ContractError::MalformedMessage {
            expected: MESSAGE_LEN,
            actual: message.len(),
        });
    }
    Ok(())
}

/// Decode the typed fields of an oracle message.
///
/// Bytes past the fixed record are ignored.
pub fn decode_exchange_rate(message: &[u8]) -> ContractResult<ExchangeRate> {
    check_len(message)?;

    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&message[TIMESTAMP_START..TIMESTAMP_END]);
    let mut price = [0u8; 16];
    price.copy_from_slice(&message[PRICE_START..PRICE_END]);
    let mut symbol = [0u8; SYMBOL_LEN];
    symbol.copy_from_slice(&message[SYMBOL_START..SYMBOL_END]);

    Ok(ExchangeRate {
        timestamp: u64::from_le_bytes(timestamp),
        price: u128::from_le_bytes(price),
        symbol: Symbol(symbol),
    })
}

/// Read the decimal scale byte of an oracle message
pub fn decimal_scale(message: &[u8]) -> ContractResult<u8> {
    check_len(message)?;
    Ok(message[DECIMALS_OFFSET])
}

/// Encode a rate into the canonical 58-byte record
pub fn encode_exchange_rate(rate: &ExchangeRate, decimals: u8) -> Vec<u8> {
    let mut message = vec![0u8; MESSAGE_LEN];
    message[TIMESTAMP_START..TIMESTAMP_END].copy_from_slice(&rate.timestamp.to_le_bytes());
    message[PRICE_START..PRICE_END].copy_from_slice(&rate.price.to_le_bytes());
    message[DECIMALS_OFFSET] = decimals;
    message[RESERVED_OFFSET] = 0;
    message[SYMBOL_START..SYMBOL_END].copy_from_slice(rate.symbol.as_bytes());
    message
}
