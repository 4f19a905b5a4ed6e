//! # bitcoin-pacts: Self-Enforcing UTXO Contracts
//!
//! Off-chain verification logic for two contracts whose rules live entirely in the
//! outputs they lock:
//!
//! - an oracle-settled price bet, decided by a Rabin-signed exchange rate message
//! - a stateful M-of-N multisig covenant that carries its progress forward in the
//!   locking script of a successor output
//!
//! Both contracts see the spending transaction only through its `hashOutputs`
//! digest (and, for the multisig, its sighash); they compute the outputs they
//! require and compare digests.

pub mod commitment;
pub mod config;
pub mod contracts;
pub mod demo;
pub mod error;
pub mod oracle;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use commitment::{ExpectedOutput, SpendingContext};
pub use contracts::{CovenantInstance, DefaultMultiSig, Party, PriceBet, Settlement, StatefulMultiSig};
pub use error::{ContractError, ContractResult};
pub use oracle::{ExchangeRate, RabinPublicKey, RabinSignature, Symbol};
