//! # Contract Walkthroughs
//!
//! Runs both contracts end to end with deterministic keys:
//!
//! 1. **Price bet**: oracle publishes a signed rate, a wrong payout and a tampered
//!    message are refused, then the winner collects the full balance
//! 2. **Stateful multisig**: a 2-of-3 covenant collects signatures one spend at a
//!    time, refuses a duplicate signature and a premature payout, then pays out
//!
//! Spending transactions are built locally and chained by txid; nothing is
//! broadcast. Every contract decision is taken from the context derived from
//! those transactions, the same way a wallet would.

use crate::commitment::{ExpectedOutput, SpendingContext};
use crate::config::demo as demo_config;
use crate::contracts::covenant::CovenantInstance;
use crate::contracts::{DefaultMultiSig, Phase, PriceBet};
use crate::error::{ContractError, ContractResult};
use crate::oracle::{encode_exchange_rate, ExchangeRate, RabinPrivateKey, Symbol};
use crate::utils::{amount, price, time};
use bitcoin::{
    absolute::LockTime,
    ecdsa,
    secp256k1::{All, Message, Secp256k1, SecretKey},
    transaction::Version,
    Amount, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use num_bigint::BigUint;
use std::str::FromStr;

/// First prime of the demo oracle key (big-endian hex)
const DEMO_ORACLE_P: &str = "ee85015b1962a10aa49c1099e7759dccbe7f801e4260a318d2cfbcf73a3614fb\
                             f896592c28d913d698da204722baa87624439159f3c2187369359c4c39956fb7";
/// Second prime of the demo oracle key (big-endian hex)
const DEMO_ORACLE_Q: &str = "d72ae9b4d97babb4c1fe4277588d06e5a913b3c2310a860e6029d08d89597fd8\
                             b53baa88bb5edf3057a21f480ab7bfddee0260dba46a9d48f7d4d03c720d2ebb";

/// Fixed 1024-bit oracle key. Public knowledge, never use it for real funds.
pub fn demo_oracle_key() -> ContractResult<RabinPrivateKey> {
    let parse = |hex: &str| {
        BigUint::parse_bytes(hex.as_bytes(), 16)
            .ok_or_else(|| ContractError::config("Invalid demo oracle prime"))
    };
    RabinPrivateKey::new(parse(DEMO_ORACLE_P)?, parse(DEMO_ORACLE_Q)?)
}

/// Which walkthrough to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    Bet,
    Multisig,
    All,
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bet" => Ok(Scenario::Bet),
            "multisig" => Ok(Scenario::Multisig),
            "all" => Ok(Scenario::All),
            _ => Err(format!("Invalid scenario: {}", s)),
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Bet => write!(f, "bet"),
            Scenario::Multisig => write!(f, "multisig"),
            Scenario::All => write!(f, "all"),
        }
    }
}

/// What happened during a run
#[derive(Debug, Default)]
pub struct DemoResults {
    /// Spends the contracts accepted
    pub accepted: Vec<String>,
    /// Spends the contracts refused, with the error code
    pub rejected: Vec<(String, &'static str)>,
}

/// Colors for terminal output
pub mod colors {
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RESET: &str = "\x1b[0m";
}

/// Walkthrough driver
pub struct PactsDemo {
    secp: Secp256k1<All>,
    balance: Amount,
    results: DemoResults,
}

impl PactsDemo {
    pub fn new(balance: Amount) -> Self {
        Self {
            secp: Secp256k1::new(),
            balance,
            results: DemoResults::default(),
        }
    }

    fn print_section(&self, title: &str) {
        println!("\n{}{}", colors::CYAN, "═".repeat(80));
        println!("{}{}{}", colors::BOLD, title, colors::RESET);
        println!("{}{}{}", colors::CYAN, "═".repeat(80), colors::RESET);
    }

    fn print_step(&self, step: u32, description: &str) {
        println!(
            "\n{}Step {}: {}{}",
            colors::YELLOW,
            step,
            description,
            colors::RESET
        );
        println!("{}{}{}", colors::BLUE, "─".repeat(80), colors::RESET);
    }

    fn print_success(&self, message: &str) {
        println!("{}✅ {}{}", colors::GREEN, message, colors::RESET);
    }

    fn print_info(&self, message: &str) {
        println!("{}ℹ️  {}{}", colors::CYAN, message, colors::RESET);
    }

    fn print_rejected(&self, message: &str) {
        println!("{}❌ {}{}", colors::RED, message, colors::RESET);
    }

    fn accept(&mut self, label: &str) {
        self.print_success(&format!("{} accepted", label));
        self.results.accepted.push(label.to_string());
    }

    /// Record a refusal; an unexpected acceptance aborts the walkthrough
    fn expect_rejection<T>(&mut self, label: &str, result: ContractResult<T>) -> ContractResult<()> {
        match result {
            Ok(_) => Err(ContractError::state(format!("{} was unexpectedly accepted", label))),
            Err(e) => {
                self.print_rejected(&format!("{} rejected: {}", label, e));
                self.results.rejected.push((label.to_string(), e.code()));
                Ok(())
            }
        }
    }

    fn key_pair(&self, seed: u8) -> ContractResult<(SecretKey, PublicKey)> {
        let secret_key = SecretKey::from_slice(&[seed; 32])
            .map_err(|e| ContractError::crypto(format!("Invalid demo secret key: {}", e)))?;
        Ok((secret_key, PublicKey::new(secret_key.public_key(&self.secp))))
    }

    fn sign(&self, secret_key: &SecretKey, ctx: &SpendingContext) -> ecdsa::Signature {
        let signature = self
            .secp
            .sign_ecdsa(&Message::from_digest(ctx.sighash), secret_key);
        ecdsa::Signature::sighash_all(signature)
    }

    /// Bet between Alice and Bob on BSV_USDC reaching 36.0000 within the next day
    pub fn run_bet(&mut self) -> ContractResult<()> {
        self.print_section("ORACLE-SETTLED PRICE BET");
        let decimals = demo_config::DEFAULT_DECIMALS;

        self.print_step(1, "Agree on the bet");
        let oracle = demo_oracle_key()?;
        let (_, alice) = self.key_pair(0xa1)?;
        let (_, bob) = self.key_pair(0xb0)?;
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let bet = PriceBet::new(
            360_000,
            Symbol::from_tag(demo_config::DEFAULT_SYMBOL),
            now,
            now + 86_400,
            oracle.public_key(),
            alice.pubkey_hash(),
            bob.pubkey_hash(),
        )?;
        self.print_info(&format!(
            "{} target {} between {} and {}",
            bet.symbol,
            price::format_scaled(bet.target_price, decimals),
            time::format_unix(bet.timestamp_from),
            time::format_unix(bet.timestamp_to)
        ));
        self.print_info(&format!("Oracle modulus: {} bits", bet.oracle_pubkey.n.bits()));
        self.print_info(&format!("Pot: {}", amount::format_dual(self.balance.to_sat())));

        // stands in for the compiled bet script
        let script_code = ScriptBuf::new_p2pkh(&bet.alice_pkh);
        let funding = funding_tx(&[ExpectedOutput {
            script_pubkey: ScriptBuf::new_p2wsh(&script_code.wscript_hash()),
            amount: self.balance,
        }]);
        let bet_utxo = OutPoint::new(funding.compute_txid(), 0);

        self.print_step(2, "Oracle publishes the rate");
        let rate = ExchangeRate {
            timestamp: now + 3_600,
            price: 371_500,
            symbol: bet.symbol,
        };
        let message = encode_exchange_rate(&rate, decimals);
        let signature = oracle.sign(&message)?;
        self.print_info(&format!(
            "{} = {} at {}",
            rate.symbol,
            price::format_scaled(rate.price, decimals),
            time::format_unix(rate.timestamp)
        ));
        self.print_info(&format!("Message: {}", hex::encode(&message)));
        self.print_info(&format!("Padding length: {}", signature.padding.len()));

        self.print_step(3, "Bob tries to collect");
        let wrong = bet.payout_for(&ExchangeRate { price: 0, ..rate }, self.balance);
        let tx = spending_tx(bet_utxo, &[wrong]);
        let ctx = SpendingContext::from_transaction(&tx, 0, &script_code, self.balance)?;
        self.expect_rejection("Payout to Bob", bet.settle(&message, &signature, &ctx))?;

        let mut forged = message.clone();
        forged[8] = 0xff;
        let tx = spending_tx(bet_utxo, &[bet.payout_for(&rate, self.balance)]);
        let ctx = SpendingContext::from_transaction(&tx, 0, &script_code, self.balance)?;
        self.expect_rejection("Forged rate", bet.settle(&forged, &signature, &ctx))?;

        self.print_step(4, "Alice collects");
        let settlement = bet.settle(&message, &signature, &ctx)?;
        self.accept(&format!(
            "Settlement paying {} to {}",
            settlement.payout.amount, settlement.winner
        ));
        self.print_info(&format!("Settlement txid: {}", tx.compute_txid()));
        Ok(())
    }

    /// 2-of-3 covenant paying a fixed destination
    pub fn run_multisig(&mut self) -> ContractResult<()> {
        self.print_section("STATEFUL 2-OF-3 MULTISIG COVENANT");

        self.print_step(1, "Register participants and fund the covenant");
        let mut participants = Vec::new();
        for seed in [0x11, 0x22, 0x33] {
            participants.push(self.key_pair(seed)?);
        }
        let pub_keys = [participants[0].1, participants[1].1, participants[2].1];
        let (_, destination) = self.key_pair(0xd5)?;
        let multisig = DefaultMultiSig::new(destination.pubkey_hash(), pub_keys)?;

        let instance = CovenantInstance::new(multisig, self.balance);
        let funding = funding_tx(&[instance.to_output()?]);
        let mut utxo = OutPoint::new(funding.compute_txid(), 0);
        let mut current = TxOut::from(instance.to_output()?);
        self.print_info(&format!("Covenant script: {}", current.script_pubkey.to_asm_string()));
        self.print_info(&format!("Funding txid: {}", funding.compute_txid()));

        self.print_step(2, "Participant 0 signs");
        let (state, tx) = self.add_signature(&current, utxo, 0, &participants[0].0)?;
        self.accept("Signature from participant 0");
        utxo = OutPoint::new(tx.compute_txid(), 0);
        current = tx.output[0].clone();

        self.print_step(3, "Replays and shortcuts");
        let replay = self.add_signature(&current, utxo, 0, &participants[0].0);
        self.expect_rejection("Second signature from participant 0", replay)?;

        let payout = state.expected_pay_output(current.value);
        let tx = spending_tx(utxo, &[payout.clone()]);
        let ctx = SpendingContext::from_transaction(&tx, 0, &current.script_pubkey, current.value)?;
        self.expect_rejection("Payout with one signature", state.pay(&ctx))?;

        self.print_step(4, "Participant 2 signs");
        let (state, tx) = self.add_signature(&current, utxo, 2, &participants[2].0)?;
        self.accept("Signature from participant 2");
        utxo = OutPoint::new(tx.compute_txid(), 0);
        current = tx.output[0].clone();
        if state.phase() == Phase::Payable {
            self.print_info("Threshold reached");
        }

        self.print_step(5, "Pay the destination");
        let tx = spending_tx(utxo, &[state.expected_pay_output(current.value)]);
        let ctx = SpendingContext::from_transaction(&tx, 0, &current.script_pubkey, current.value)?;
        let paid = state.pay(&ctx)?;
        self.accept(&format!("Payout of {}", paid.amount));
        self.print_info(&format!("Payout txid: {}", tx.compute_txid()));
        Ok(())
    }

    /// Spend `current` to record participant `index`, reading the state from the script
    fn add_signature(
        &self,
        current: &TxOut,
        utxo: OutPoint,
        index: usize,
        secret_key: &SecretKey,
    ) -> ContractResult<(DefaultMultiSig, Transaction)> {
        let instance = CovenantInstance::<DefaultMultiSig>::from_output(current)?;
        let next = instance.state.expected_add_output(index, instance.balance)?;
        let tx = spending_tx(utxo, &[next]);
        let ctx =
            SpendingContext::from_transaction(&tx, 0, &current.script_pubkey, instance.balance)?;

        let signature = self.sign(secret_key, &ctx);
        let state = instance.state.add(index, &signature, &ctx, None)?;
        self.print_info(&format!(
            "Flags: {:?} ({} of {})",
            state.validated(),
            state.true_count(),
            crate::config::multisig::DEFAULT_N
        ));
        Ok((state, tx))
    }

    /// Run the selected walkthroughs
    pub fn run(mut self, scenario: Scenario) -> ContractResult<DemoResults> {
        log::info!("Running {} demo with {}", scenario, self.balance);
        if matches!(scenario, Scenario::Bet | Scenario::All) {
            self.run_bet()?;
        }
        if matches!(scenario, Scenario::Multisig | Scenario::All) {
            self.run_multisig()?;
        }

        self.print_section("DEMO COMPLETED");
        self.print_info(&format!(
            "{} spends accepted, {} rejected",
            self.results.accepted.len(),
            self.results.rejected.len()
        ));
        Ok(self.results)
    }
}

fn funding_tx(outputs: &[ExpectedOutput]) -> Transaction {
    spending_tx(OutPoint::null(), outputs)
}

fn spending_tx(previous_output: OutPoint, outputs: &[ExpectedOutput]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: outputs.iter().cloned().map(TxOut::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_oracle_key() {
        let key = demo_oracle_key().unwrap();
        assert_eq!(key.public_key().n.bits(), 1024);
    }

    #[test]
    fn test_scenario_parsing() {
        assert_eq!("Bet".parse::<Scenario>().unwrap(), Scenario::Bet);
        assert_eq!("multisig".parse::<Scenario>().unwrap(), Scenario::Multisig);
        assert_eq!(Scenario::All.to_string(), "all");
        assert!("vault".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_bet_walkthrough() {
        let results = PactsDemo::new(Amount::from_sat(10_000))
            .run(Scenario::Bet)
            .unwrap();
        assert_eq!(results.accepted.len(), 1);
        assert_eq!(
            results.rejected.iter().map(|(_, code)| *code).collect::<Vec<_>>(),
            vec!["OUTPUT_COMMITMENT_MISMATCH", "ORACLE_SIGNATURE_INVALID"]
        );
    }

    #[test]
    fn test_multisig_walkthrough() {
        let results = PactsDemo::new(Amount::from_sat(10_000))
            .run(Scenario::Multisig)
            .unwrap();
        assert_eq!(results.accepted.len(), 3);
        assert_eq!(
            results.rejected.iter().map(|(_, code)| *code).collect::<Vec<_>>(),
            vec!["INVALID_INDEX_OR_ALREADY_SET", "THRESHOLD_NOT_REACHED"]
        );
    }
}
