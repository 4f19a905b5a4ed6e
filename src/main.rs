//! # pacts: Self-Enforcing UTXO Contracts
//!
//! Command line front end for the two contracts in `bitcoin_pacts`:
//!
//! - **Price bet**: two parties bet on an exchange rate; an oracle-signed (Rabin)
//!   price message decides who takes the whole balance
//! - **Stateful multisig**: an M-of-N covenant that collects one signature per spend
//!   and pays a fixed destination once the threshold is reached
//!
//! Nothing here talks to a node. Commands take the data a wallet would have at hand
//! (oracle message, signature, spent value, `hashOutputs`) and run the same checks
//! the locking scripts run.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Decode an oracle message
//! pacts decode 00f15365000000009...
//!
//! # Write the demo oracle key, sign a message and verify it
//! pacts demo-key
//! pacts oracle-sign --message 00f15365000000009... > sig.json
//! pacts verify-oracle --key oracle_pub.json --message 00f1... --signature sig.json
//!
//! # Create a bet and check a settlement against it
//! pacts create-bet --target 360000 --from 1700000000 --to 1700086400 \
//!     --alice-pkh <hex> --bob-pkh <hex>
//! pacts settle --message <hex> --signature sig.json --value 10000 --hash-outputs <hex>
//!
//! # Scripted walkthroughs
//! pacts demo --scenario all
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` to see every check.

use anyhow::{anyhow, Context, Result};
use bitcoin::{hashes::Hash, Amount, PubkeyHash, Script, ScriptBuf};
use bitcoin_pacts::{
    commitment::{self, SpendingContext},
    config::{demo as demo_config, env, files},
    contracts::{covenant, multisig, Phase, PriceBet, StatefulMultiSig},
    demo::{self, PactsDemo, Scenario},
    oracle::{codec, RabinPrivateKey, RabinPublicKey, RabinSignature, Symbol},
    services,
    utils::{hex_bytes, price, time},
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pacts")]
#[command(about = "Oracle-settled price bets and stateful multisig covenants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an oracle message and print the rate as JSON
    Decode {
        /// Oracle message (hex)
        message: String,
    },
    /// Write the demo oracle key pair to disk
    DemoKey {
        /// Private key file
        #[arg(short, long, default_value = files::DEFAULT_ORACLE_KEY_FILE)]
        output: String,
    },
    /// Sign an oracle message with a private key file, printing the signature JSON
    OracleSign {
        /// Private key file
        #[arg(short, long, default_value = files::DEFAULT_ORACLE_KEY_FILE)]
        key: String,
        /// Oracle message (hex)
        #[arg(short, long)]
        message: String,
    },
    /// Verify an oracle signature
    VerifyOracle {
        /// Public key file (`{"n": "<hex>"}`)
        #[arg(short, long)]
        key: String,
        /// Oracle message (hex)
        #[arg(short, long)]
        message: String,
        /// Signature file
        #[arg(short, long)]
        signature: String,
    },
    /// Create a price bet and save its parameters
    CreateBet {
        /// Target price, scaled by the oracle's decimals
        #[arg(long)]
        target: u128,
        /// Asset pair tag
        #[arg(long, default_value = demo_config::DEFAULT_SYMBOL)]
        symbol: String,
        /// Start of the settlement window (unix seconds, inclusive)
        #[arg(long)]
        from: u64,
        /// End of the settlement window (unix seconds, inclusive)
        #[arg(long)]
        to: u64,
        /// Alice's payout key hash (hex), wins at or above the target
        #[arg(long)]
        alice_pkh: String,
        /// Bob's payout key hash (hex), wins below the target
        #[arg(long)]
        bob_pkh: String,
        /// Oracle private key file; its public half goes into the bet
        #[arg(short, long, default_value = files::DEFAULT_ORACLE_KEY_FILE)]
        key: String,
        /// Bet file to write
        #[arg(short, long, default_value = files::DEFAULT_BET_FILE)]
        output: String,
    },
    /// Check a settlement against a bet
    Settle {
        /// Bet file
        #[arg(short, long, default_value = files::DEFAULT_BET_FILE)]
        bet: String,
        /// Oracle message (hex)
        #[arg(short, long)]
        message: String,
        /// Signature file
        #[arg(short, long)]
        signature: String,
        /// Value of the bet output in satoshis
        #[arg(long)]
        value: u64,
        /// hashOutputs of the spending transaction (hex)
        #[arg(long)]
        hash_outputs: String,
    },
    /// Decode the state of a multisig covenant locking script (up to 3 keys)
    InspectCovenant {
        /// Locking script (hex)
        script: String,
    },
    /// Verify a file of settlement requests in parallel
    Batch {
        /// Bet file
        #[arg(short, long, default_value = files::DEFAULT_BET_FILE)]
        bet: String,
        /// Requests file (JSON array)
        #[arg(short, long)]
        requests: String,
    },
    /// Run scripted walkthroughs with the demo oracle
    Demo {
        /// Scenario: bet, multisig, all
        #[arg(short, long, default_value = "all")]
        scenario: Scenario,
        /// Contract balance in satoshis
        #[arg(short, long, default_value_t = demo_config::DEFAULT_DEMO_AMOUNT)]
        amount: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env::LOG_FILTER, env::DEFAULT_LOG_LEVEL),
    )
    .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { message } => decode(&message)?,
        Commands::DemoKey { output } => demo_key(&output)?,
        Commands::OracleSign { key, message } => oracle_sign(&key, &message)?,
        Commands::VerifyOracle {
            key,
            message,
            signature,
        } => verify_oracle(&key, &message, &signature)?,
        Commands::CreateBet {
            target,
            symbol,
            from,
            to,
            alice_pkh,
            bob_pkh,
            key,
            output,
        } => create_bet(target, &symbol, from, to, &alice_pkh, &bob_pkh, &key, &output)?,
        Commands::Settle {
            bet,
            message,
            signature,
            value,
            hash_outputs,
        } => settle(&bet, &message, &signature, value, &hash_outputs)?,
        Commands::InspectCovenant { script } => inspect_covenant(&script)?,
        Commands::Batch { bet, requests } => batch(&bet, &requests).await?,
        Commands::Demo { scenario, amount } => {
            let results = PactsDemo::new(Amount::from_sat(amount)).run(scenario)?;
            log::info!(
                "Demo finished: {} accepted, {} rejected",
                results.accepted.len(),
                results.rejected.len()
            );
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(filename: &str) -> Result<T> {
    let json = std::fs::read_to_string(filename).with_context(|| format!("reading {}", filename))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", filename))
}

fn parse_pkh(input: &str) -> Result<PubkeyHash> {
    Ok(PubkeyHash::from_byte_array(hex_bytes::decode_array::<20>(input)?))
}

fn decode(message_hex: &str) -> Result<()> {
    let message = hex_bytes::decode(message_hex)?;
    let rate = codec::decode_exchange_rate(&message)?;
    let decimals = codec::decimal_scale(&message)?;

    println!("{}", serde_json::to_string_pretty(&rate)?);
    log::info!(
        "{} = {} at {}",
        rate.symbol,
        price::format_scaled(rate.price, decimals),
        time::format_unix(rate.timestamp)
    );
    Ok(())
}

fn demo_key(output: &str) -> Result<()> {
    let key = demo::demo_oracle_key()?;
    std::fs::write(output, serde_json::to_string_pretty(&key)?)?;

    let public_file = output.replace(".json", "_pub.json");
    let public_file = if public_file == output {
        format!("{}.pub", output)
    } else {
        public_file
    };
    std::fs::write(&public_file, serde_json::to_string_pretty(&key.public_key())?)?;

    println!("Demo oracle key written to {} (public key: {})", output, public_file);
    log::warn!("The demo oracle key is public; never settle real funds with it");
    Ok(())
}

fn oracle_sign(key_file: &str, message_hex: &str) -> Result<()> {
    let key: RabinPrivateKey = read_json(key_file)?;
    let message = hex_bytes::decode(message_hex)?;
    let signature = key.sign(&message)?;
    println!("{}", serde_json::to_string_pretty(&signature)?);
    Ok(())
}

fn verify_oracle(key_file: &str, message_hex: &str, signature_file: &str) -> Result<()> {
    let key: RabinPublicKey = read_json(key_file)?;
    let signature: RabinSignature = read_json(signature_file)?;
    let message = hex_bytes::decode(message_hex)?;

    if key.verify(&message, &signature) {
        println!("✅ Oracle signature valid ({}-bit modulus)", key.n.bits());
        Ok(())
    } else {
        Err(anyhow!("Oracle signature invalid"))
    }
}

#[allow(clippy::too_many_arguments)]
fn create_bet(
    target: u128,
    symbol: &str,
    from: u64,
    to: u64,
    alice_pkh: &str,
    bob_pkh: &str,
    key_file: &str,
    output: &str,
) -> Result<()> {
    let oracle: RabinPrivateKey = read_json(key_file)?;
    let bet = PriceBet::new(
        target,
        Symbol::from_tag(symbol),
        from,
        to,
        oracle.public_key(),
        parse_pkh(alice_pkh)?,
        parse_pkh(bob_pkh)?,
    )?;
    bet.save_to_file(output)?;

    println!("Price bet on {} saved to {}", bet.symbol, output);
    println!("  Target:  {}", bet.target_price);
    println!(
        "  Window:  {} .. {}",
        time::format_unix(bet.timestamp_from),
        time::format_unix(bet.timestamp_to)
    );
    println!("  Alice:   {} (wins at or above target)", bet.alice_pkh);
    println!("  Bob:     {} (wins below target)", bet.bob_pkh);
    Ok(())
}

fn settle(
    bet_file: &str,
    message_hex: &str,
    signature_file: &str,
    value: u64,
    hash_outputs: &str,
) -> Result<()> {
    let bet = PriceBet::load_from_file(bet_file)?;
    let signature: RabinSignature = read_json(signature_file)?;
    let message = hex_bytes::decode(message_hex)?;
    let ctx = SpendingContext::new(Amount::from_sat(value), commitment::parse_digest(hash_outputs)?);

    let settlement = bet.settle(&message, &signature, &ctx)?;
    println!("✅ Settlement valid");
    println!("  Winner:  {}", settlement.winner);
    println!("  Price:   {}", settlement.rate.price);
    println!("  Payout:  {} to {}", settlement.payout.amount, settlement.payout.script_pubkey);
    Ok(())
}

fn inspect_covenant(script_hex: &str) -> Result<()> {
    let script = ScriptBuf::from_bytes(hex_bytes::decode(script_hex)?);
    let (m, n) = multisig::template_params(&script)?;

    match (m, n) {
        (1, 1) => print_multisig::<1, 1>(&script),
        (2, 1) => print_multisig::<2, 1>(&script),
        (2, 2) => print_multisig::<2, 2>(&script),
        (3, 1) => print_multisig::<3, 1>(&script),
        (3, 2) => print_multisig::<3, 2>(&script),
        (3, 3) => print_multisig::<3, 3>(&script),
        _ => Err(anyhow!(
            "{}-of-{} multisig covenant is not supported by inspect-covenant",
            n,
            m
        )),
    }
}

fn print_multisig<const M: usize, const N: usize>(script: &Script) -> Result<()> {
    let state: StatefulMultiSig<M, N> = covenant::read_state(script)?;

    println!("Template: {}-of-{}", N, M);
    println!("Destination: {}", state.dest_pkh());
    for (i, (key, validated)) in state.pub_keys().iter().zip(state.validated()).enumerate() {
        println!(
            "  [{}] {} {}",
            i,
            key,
            if *validated { "signed" } else { "pending" }
        );
    }
    match state.phase() {
        Phase::Collecting { have, need } => println!("Collecting: {}/{} signatures", have, need),
        Phase::Payable => println!("Payable: threshold reached"),
    }
    Ok(())
}

async fn batch(bet_file: &str, requests_file: &str) -> Result<()> {
    let bet = PriceBet::load_from_file(bet_file)?;
    let requests = services::load_requests(requests_file)?;
    let results = services::verify_settlements(&bet, requests).await;

    let mut valid = 0;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(settlement) => {
                valid += 1;
                println!("[{}] ✅ {} wins {}", i, settlement.winner, settlement.payout.amount);
            }
            Err(e) => println!("[{}] ❌ {}: {}", i, e.code(), e),
        }
    }
    println!("{}/{} settlements valid", valid, results.len());
    Ok(())
}
