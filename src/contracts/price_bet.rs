//! # Oracle-Settled Price Bet
//!
//! Two parties lock funds in one output. Whoever is right about the exchange rate
//! at settlement takes the whole balance: Alice if the oracle-published price is at
//! or above the target, Bob otherwise. A price exactly equal to the target pays
//! Alice.
//!
//! ## Settlement Checks
//!
//! 1. Oracle Rabin signature over the raw message
//! 2. Message decodes into an exchange rate
//! 3. Timestamp inside `[timestamp_from, timestamp_to]`
//! 4. Symbol matches the bet
//! 5. Spending transaction pays the full balance to the winner, and nothing else
//!
//! The first failing check is reported; there is no partial settlement.

use crate::commitment::{self, ExpectedOutput, SpendingContext};
use crate::error::{ContractError, ContractResult, WindowBound};
use crate::oracle::{codec, rabin, ExchangeRate, RabinPublicKey, RabinSignature, Symbol};
use bitcoin::{Amount, PubkeyHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two sides of a bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    /// Wins when `price >= target_price`
    Alice,
    /// Wins when `price < target_price`
    Bob,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Alice => write!(f, "alice"),
            Party::Bob => write!(f, "bob"),
        }
    }
}

/// Outcome of a successful settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub winner: Party,
    pub rate: ExchangeRate,
    pub payout: ExpectedOutput,
}

/// Immutable parameters of a price bet, fixed when it is funded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBet {
    /// Price target that needs to be reached
    pub target_price: u128,
    /// Asset pair, e.g. `BSV_USDC`
    pub symbol: Symbol,
    /// Settlement window, inclusive on both ends
    pub timestamp_from: u64,
    pub timestamp_to: u64,
    /// Oracle's Rabin public key
    pub oracle_pubkey: RabinPublicKey,
    /// Payout key hashes of both players
    pub alice_pkh: PubkeyHash,
    pub bob_pkh: PubkeyHash,
}

impl PriceBet {
    pub fn new(
        target_price: u128,
        symbol: Symbol,
        timestamp_from: u64,
        timestamp_to: u64,
        oracle_pubkey: RabinPublicKey,
        alice_pkh: PubkeyHash,
        bob_pkh: PubkeyHash,
    ) -> ContractResult<Self> {
        let bet = Self {
            target_price,
            symbol,
            timestamp_from,
            timestamp_to,
            oracle_pubkey,
            alice_pkh,
            bob_pkh,
        };
        bet.validate()?;
        Ok(bet)
    }

    /// Parameter sanity checks, also applied to bets loaded from disk
    pub fn validate(&self) -> ContractResult<()> {
        if self.timestamp_from > self.timestamp_to {
            return Err(ContractError::config(format!(
                "Empty settlement window: {} > {}",
                self.timestamp_from, self.timestamp_to
            )));
        }
        if self.alice_pkh == self.bob_pkh {
            return Err(ContractError::config("Both parties share a payout key hash"));
        }
        Ok(())
    }

    /// Winner for a given price. Ties go to Alice.
    pub fn winner_for(&self, price: u128) -> Party {
        if price >= self.target_price {
            Party::Alice
        } else {
            Party::Bob
        }
    }

    pub fn pkh_of(&self, party: Party) -> &PubkeyHash {
        match party {
            Party::Alice => &self.alice_pkh,
            Party::Bob => &self.bob_pkh,
        }
    }

    /// Output that settles the bet for `rate` when the contract holds `balance`
    pub fn payout_for(&self, rate: &ExchangeRate, balance: Amount) -> ExpectedOutput {
        commitment::p2pkh(self.pkh_of(self.winner_for(rate.price)), balance)
    }

    /// Check the window and symbol of a decoded rate
    pub fn check_rate(&self, rate: &ExchangeRate) -> ContractResult<()> {
        if rate.timestamp < self.timestamp_from || rate.timestamp > self.timestamp_to {
            let bound = if rate.timestamp < self.timestamp_from {
                WindowBound::TooEarly
            } else {
                WindowBound::TooLate
            };
            log::warn!("Timestamp {}: {}", bound, rate.timestamp);
            return Err(ContractError::TimestampOutOfWindow {
                bound,
                timestamp: rate.timestamp,
                from: self.timestamp_from,
                to: self.timestamp_to,
            });
        }

        if rate.symbol != self.symbol {
            log::warn!("Wrong symbol: {} (bet is on {})", rate.symbol, self.symbol);
            return Err(ContractError::SymbolMismatch {
                expected: self.symbol.to_string(),
                actual: rate.symbol.to_string(),
            });
        }
        Ok(())
    }

    /// Settle the bet with an oracle message, its signature and the spending context
    pub fn settle(
        &self,
        message: &[u8],
        signature: &RabinSignature,
        ctx: &SpendingContext,
    ) -> ContractResult<Settlement> {
        if !rabin::verify(message, signature, &self.oracle_pubkey) {
            log::warn!("Oracle sig verify failed for {}-byte message", message.len());
            return Err(ContractError::OracleSignatureInvalid);
        }

        let rate = codec::decode_exchange_rate(message)?;
        log::debug!(
            "Oracle rate: {} {} at {}",
            rate.symbol,
            rate.price,
            rate.timestamp
        );
        self.check_rate(&rate)?;

        let winner = self.winner_for(rate.price);
        let payout = self.payout_for(&rate, ctx.utxo_value);
        commitment::enforce_exact(&[payout.clone()], ctx)?;

        log::info!(
            "Price bet settled: {} wins {} (price {} vs target {})",
            winner,
            ctx.utxo_value,
            rate.price,
            self.target_price
        );
        Ok(Settlement {
            winner,
            rate,
            payout,
        })
    }

    pub fn save_to_file(&self, filename: &str) -> ContractResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(filename, json)?;
        Ok(())
    }

    pub fn load_from_file(filename: &str) -> ContractResult<Self> {
        let json = std::fs::read_to_string(filename)?;
        let bet: PriceBet = serde_json::from_str(&json)?;
        bet.validate()?;
        Ok(bet)
    }
}
