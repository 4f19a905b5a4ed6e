//! # Contracts Module
//!
//! Verification logic for the contracts this crate supports.
//!
//! ## Contract Types
//!
//! - **Price Bet**: two-party bet settled by an oracle-signed exchange rate
//! - **Covenant**: generic carry-forward state machine over a locking script
//! - **Stateful MultiSig**: M-of-N covenant accumulating signatures across spends

pub mod covenant;
pub mod multisig;
pub mod price_bet;

#[cfg(test)]
mod tests;

pub use covenant::{CovenantInstance, CovenantState};
pub use multisig::{DefaultMultiSig, Phase, StatefulMultiSig};
pub use price_bet::{Party, PriceBet, Settlement};
