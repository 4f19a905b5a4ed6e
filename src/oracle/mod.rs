//! # Oracle Module
//!
//! Everything needed to trust a price published off-chain.
//!
//! ## Components
//!
//! - **Codec**: fixed-layout decoding of exchange-rate records
//! - **Rabin**: signature verification against the oracle's public key

pub mod codec;
pub mod rabin;

pub use codec::{decode_exchange_rate, encode_exchange_rate, ExchangeRate, Symbol};
pub use rabin::{RabinPrivateKey, RabinPublicKey, RabinSignature};
