//! # Configuration Constants
//!
//! Layout offsets, cryptographic limits and defaults used throughout the crate.
//! Offsets in [`oracle`] are a compatibility commitment with every deployed
//! contract instance; changing them breaks settlement.

/// Oracle message record layout
pub mod oracle {
    /// Timestamp, u64 little-endian
    pub const TIMESTAMP_START: usize = 0;
    pub const TIMESTAMP_END: usize = 8;

    /// Price, u128 little-endian
    pub const PRICE_START: usize = 8;
    pub const PRICE_END: usize = 24;

    /// Decimal scale of the price, read by callers only
    pub const DECIMALS_OFFSET: usize = 24;

    /// Reserved byte, always zero when encoding
    pub const RESERVED_OFFSET: usize = 25;

    /// Asset pair identifier
    pub const SYMBOL_START: usize = 26;
    pub const SYMBOL_END: usize = 58;

    /// Width of the symbol field in bytes
    pub const SYMBOL_LEN: usize = SYMBOL_END - SYMBOL_START;

    /// Minimum length of a decodable oracle message
    pub const MESSAGE_LEN: usize = SYMBOL_END;
}

/// Rabin signature scheme limits
pub mod rabin {
    /// Smallest modulus accepted by the verifier.
    ///
    /// Anything below this is trivially factorable and the signature proves nothing.
    pub const MIN_MODULUS_BITS: u64 = 1024;

    /// Longest padding a signer may append before the digest becomes a square
    pub const MAX_PADDING_LEN: usize = 255;
}

/// Stateful multisig defaults
pub mod multisig {
    /// Number of registered participants for the default covenant
    pub const DEFAULT_M: usize = 3;

    /// Signatures required before payout for the default covenant
    pub const DEFAULT_N: usize = 2;
}

/// Demo parameters
pub mod demo {
    /// Balance locked in demo contracts (0.00010000 BTC)
    pub const DEFAULT_DEMO_AMOUNT: u64 = 10_000;

    /// Asset pair the demo bet is written on
    pub const DEFAULT_SYMBOL: &str = "BSV_USDC";

    /// Decimal scale published by the demo oracle
    pub const DEFAULT_DECIMALS: u8 = 4;
}

/// File paths and names
pub mod files {
    /// Default price bet parameter file
    pub const DEFAULT_BET_FILE: &str = "price_bet.json";

    /// Default oracle key file
    pub const DEFAULT_ORACLE_KEY_FILE: &str = "oracle_key.json";
}

/// Environment variable names
pub mod env {
    /// Log filter, read by env_logger
    pub const LOG_FILTER: &str = "RUST_LOG";

    /// Default log level when `RUST_LOG` is unset
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}
