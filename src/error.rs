//! # Error Types for Contract Verification
//!
//! Every check performed by the contracts in this crate either passes or fails with
//! one of the variants below. Verification failures are terminal: the spending
//! transaction is invalid and nothing is retried.

use std::fmt;
use thiserror::Error;

/// Which edge of the settlement window an oracle timestamp fell outside of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBound {
    /// Timestamp is before `timestamp_from`
    TooEarly,
    /// Timestamp is after `timestamp_to`
    TooLate,
}

impl fmt::Display for WindowBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowBound::TooEarly => write!(f, "too early"),
            WindowBound::TooLate => write!(f, "too late"),
        }
    }
}

/// Main error type for all contract operations
#[derive(Debug, Error)]
pub enum ContractError {
    /// Rabin signature over the oracle message did not verify
    #[error("Oracle sig verify failed")]
    OracleSignatureInvalid,

    /// Oracle message is shorter than the fixed record layout
    #[error("Malformed oracle message: expected at least {expected} bytes, got {actual}")]
    MalformedMessage { expected: usize, actual: usize },

    /// Oracle timestamp outside the contract's settlement window
    #[error("Timestamp {bound}: {timestamp} not in [{from}, {to}]")]
    TimestampOutOfWindow {
        bound: WindowBound,
        timestamp: u64,
        from: u64,
        to: u64,
    },

    /// Oracle message is for a different asset pair
    #[error("Wrong symbol: expected {expected}, got {actual}")]
    SymbolMismatch { expected: String, actual: String },

    /// Spending transaction does not commit to the expected outputs
    #[error("hashOutputs mismatch: expected {expected}, declared {declared}")]
    OutputCommitmentMismatch { expected: String, declared: String },

    /// Participant index out of range, or its flag is already set
    #[error("Invalid pubKeyIdx {index}: out of range or already validated")]
    InvalidIndexOrAlreadySet { index: usize },

    /// Signature does not verify against the participant's public key
    #[error("signature check failed for participant {index}")]
    SignatureCheckFailed { index: usize },

    /// Not enough participants have validated yet
    #[error("Not enough valid signatures: have {have}, need {need}")]
    ThresholdNotReached { have: usize, need: usize },

    /// Threshold reached; the covenant only accepts the payout now
    #[error("Threshold already reached ({need} signatures); only payout is allowed")]
    ThresholdAlreadyReached { need: usize },

    /// Locking script does not hold a well-formed covenant state
    #[error("Malformed covenant state: {message}")]
    MalformedState { message: String },

    /// Cryptographic operation failures outside of verification (key setup, signing)
    #[error("Cryptographic operation failed: {message}")]
    Cryptography { message: String },

    /// A verification task died before producing a verdict
    #[error("Verification task failed: {message}")]
    TaskFailed { message: String },

    /// Invalid contract parameters
    #[error("Contract configuration error: {message}")]
    Configuration { message: String },

    /// Hex, script or transaction encoding failures
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// File I/O operations
    #[error("File operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for contract operations
pub type ContractResult<T> = Result<T, ContractError>;

impl ContractError {
    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a cryptography error with a message
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Cryptography {
            message: message.into(),
        }
    }

    /// Create an encoding error with a message
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a malformed covenant state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::MalformedState {
            message: message.into(),
        }
    }

    /// Stable identifier for the failure kind, suitable for logs and exit reports
    pub fn code(&self) -> &'static str {
        match self {
            ContractError::OracleSignatureInvalid => "ORACLE_SIGNATURE_INVALID",
            ContractError::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            ContractError::TimestampOutOfWindow { .. } => "TIMESTAMP_OUT_OF_WINDOW",
            ContractError::SymbolMismatch { .. } => "SYMBOL_MISMATCH",
            ContractError::OutputCommitmentMismatch { .. } => "OUTPUT_COMMITMENT_MISMATCH",
            ContractError::InvalidIndexOrAlreadySet { .. } => "INVALID_INDEX_OR_ALREADY_SET",
            ContractError::SignatureCheckFailed { .. } => "SIGNATURE_CHECK_FAILED",
            ContractError::ThresholdNotReached { .. } => "THRESHOLD_NOT_REACHED",
            ContractError::ThresholdAlreadyReached { .. } => "THRESHOLD_ALREADY_REACHED",
            ContractError::MalformedState { .. } => "MALFORMED_STATE",
            ContractError::Cryptography { .. } => "CRYPTOGRAPHY",
            ContractError::TaskFailed { .. } => "TASK_FAILED",
            ContractError::Configuration { .. } => "CONFIGURATION",
            ContractError::Encoding { .. } => "ENCODING",
            ContractError::Io { .. } => "IO",
            ContractError::Json { .. } => "JSON",
        }
    }

    /// Check if this error means "the spending transaction is invalid",
    /// as opposed to a local setup or I/O problem
    pub fn is_verification_failure(&self) -> bool {
        !matches!(
            self,
            ContractError::Configuration { .. }
                | ContractError::Cryptography { .. }
                | ContractError::TaskFailed { .. }
                | ContractError::Encoding { .. }
                | ContractError::Io { .. }
                | ContractError::Json { .. }
        )
    }
}
