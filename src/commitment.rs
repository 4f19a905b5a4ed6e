//! # Output Commitments
//!
//! A spending transaction commits to its outputs through a single digest
//! (`hashOutputs` in BIP143 terms). Contracts never see the transaction itself;
//! they compute the outputs they expect, hash them the same way and compare.
//!
//! ## Serialization
//!
//! ```text
//! for each output, in order:
//!     amount          8 bytes, little-endian
//!     script length   CompactSize
//!     script_pubkey
//! digest = SHA256(SHA256(concatenation))
//! ```

use crate::error::{ContractError, ContractResult};
use bitcoin::{
    consensus::encode::serialize,
    hashes::{sha256d, Hash},
    sighash::{EcdsaSighashType, SighashCache},
    Amount, PubkeyHash, Script, ScriptBuf, Transaction, TxOut,
};

/// An output the spending transaction is required to contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    /// Locking descriptor the funds are sent to
    pub script_pubkey: ScriptBuf,
    /// Amount carried by the output
    pub amount: Amount,
}

impl ExpectedOutput {
    /// Ledger serialization of this single output
    pub fn serialize(&self) -> Vec<u8> {
        serialize(&TxOut::from(self.clone()))
    }
}

impl From<ExpectedOutput> for TxOut {
    fn from(output: ExpectedOutput) -> Self {
        TxOut {
            value: output.amount,
            script_pubkey: output.script_pubkey,
        }
    }
}

impl From<&TxOut> for ExpectedOutput {
    fn from(txout: &TxOut) -> Self {
        Self {
            script_pubkey: txout.script_pubkey.clone(),
            amount: txout.value,
        }
    }
}

/// Build an expected output paying `amount` to `script_pubkey`
pub fn build(script_pubkey: ScriptBuf, amount: Amount) -> ExpectedOutput {
    ExpectedOutput {
        script_pubkey,
        amount,
    }
}

/// Build an expected pay-to-pubkey-hash output
pub fn p2pkh(pkh: &PubkeyHash, amount: Amount) -> ExpectedOutput {
    build(ScriptBuf::new_p2pkh(pkh), amount)
}

/// Double-SHA256 over the ordered serialized outputs
pub fn canonical_hash(outputs: &[ExpectedOutput]) -> sha256d::Hash {
    let mut data = Vec::new();
    for output in outputs {
        data.extend_from_slice(&output.serialize());
    }
    sha256d::Hash::hash(&data)
}

/// Hex of a digest in serialization byte order
pub fn digest_hex(digest: &sha256d::Hash) -> String {
    hex::encode(digest.as_byte_array())
}

/// Parse a digest given as hex in serialization byte order
pub fn parse_digest(input: &str) -> ContractResult<sha256d::Hash> {
    let bytes = crate::utils::hex_bytes::decode_array::<32>(input)?;
    Ok(sha256d::Hash::from_byte_array(bytes))
}

/// What the transaction-construction layer tells a contract about the spend
/// of one contract input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendingContext {
    /// Value of the output being spent (the contract balance)
    pub utxo_value: Amount,
    /// Digest of all outputs of the spending transaction
    pub hash_outputs: sha256d::Hash,
    /// SIGHASH_ALL digest signed by participants for this input
    pub sighash: [u8; 32],
    /// Change output declared by the spender, appended after contract outputs
    pub change: Option<ExpectedOutput>,
}

impl SpendingContext {
    pub fn new(utxo_value: Amount, hash_outputs: sha256d::Hash) -> Self {
        Self {
            utxo_value,
            hash_outputs,
            sighash: [0u8; 32],
            change: None,
        }
    }

    /// Context for a transaction that would create exactly `outputs`
    pub fn for_outputs(utxo_value: Amount, outputs: &[ExpectedOutput]) -> Self {
        Self::new(utxo_value, canonical_hash(outputs))
    }

    pub fn with_sighash(mut self, sighash: [u8; 32]) -> Self {
        self.sighash = sighash;
        self
    }

    pub fn with_change(mut self, change: ExpectedOutput) -> Self {
        self.change = Some(change);
        self
    }

    /// Derive the context from a segwit v0 spend of `input_index`.
    ///
    /// `script_code` is the locking script of the spent contract output and
    /// `value` its amount.
    pub fn from_transaction(
        tx: &Transaction,
        input_index: usize,
        script_code: &Script,
        value: Amount,
    ) -> ContractResult<Self> {
        let outputs: Vec<ExpectedOutput> = tx.output.iter().map(ExpectedOutput::from).collect();
        let mut cache = SighashCache::new(tx);
        let sighash = cache
            .p2wsh_signature_hash(input_index, script_code, value, EcdsaSighashType::All)
            .map_err(|e| ContractError::encoding(format!("Sighash computation failed: {}", e)))?;

        Ok(Self {
            utxo_value: value,
            hash_outputs: canonical_hash(&outputs),
            sighash: sighash.to_byte_array(),
            change: None,
        })
    }
}

/// Require the spending transaction to create exactly `expected`, followed by the
/// declared change output if there is one.
pub fn enforce(expected: &[ExpectedOutput], ctx: &SpendingContext) -> ContractResult<()> {
    let mut outputs = expected.to_vec();
    if let Some(change) = &ctx.change {
        outputs.push(change.clone());
    }

    let digest = canonical_hash(&outputs);
    if digest != ctx.hash_outputs {
        log::warn!(
            "hashOutputs mismatch: expected {} declared {}",
            digest_hex(&digest),
            digest_hex(&ctx.hash_outputs)
        );
        return Err(ContractError::OutputCommitmentMismatch {
            expected: digest_hex(&digest),
            declared: digest_hex(&ctx.hash_outputs),
        });
    }
    Ok(())
}

/// Require the spending transaction to create `expected` and nothing else.
/// A declared change output is refused rather than appended.
pub fn enforce_exact(expected: &[ExpectedOutput], ctx: &SpendingContext) -> ContractResult<()> {
    if let Some(change) = &ctx.change {
        log::warn!("Change output to {} not allowed here", change.script_pubkey);
        return Err(ContractError::OutputCommitmentMismatch {
            expected: digest_hex(&canonical_hash(expected)),
            declared: digest_hex(&ctx.hash_outputs),
        });
    }
    enforce(expected, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hex_bytes::decode_array;
    use bitcoin::{
        absolute::LockTime, transaction::Version, OutPoint, Sequence, TxIn, Witness,
    };

    /// Outputs of the native P2WPKH example in BIP143
    fn bip143_outputs() -> Vec<ExpectedOutput> {
        let pkh_a = PubkeyHash::from_byte_array(
            decode_array("8280b37df378db99f66f85c95a783a76ac7a6d59").unwrap(),
        );
        let pkh_b = PubkeyHash::from_byte_array(
            decode_array("3bde42dbee7e4dbe6a21b2d50ce2f0167faa8159").unwrap(),
        );
        vec![
            p2pkh(&pkh_a, Amount::from_sat(112_340_000)),
            p2pkh(&pkh_b, Amount::from_sat(223_450_000)),
        ]
    }

    fn spending_tx(outputs: &[ExpectedOutput]) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: outputs.iter().cloned().map(TxOut::from).collect(),
        }
    }

    #[test]
    fn test_bip143_hash_outputs() {
        let digest = canonical_hash(&bip143_outputs());
        assert_eq!(
            digest_hex(&digest),
            "863ef3e1a92afbfdb97f31ad0fc7683ee943e9abcf2501590ff8f6551f47e5e5"
        );
    }

    #[test]
    fn test_output_serialization() {
        let output = &bip143_outputs()[0];
        assert_eq!(
            hex::encode(output.serialize()),
            "202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac"
        );
    }

    #[test]
    fn test_order_matters() {
        let mut outputs = bip143_outputs();
        let forward = canonical_hash(&outputs);
        outputs.reverse();
        assert_ne!(forward, canonical_hash(&outputs));
    }

    #[test]
    fn test_enforce_exact_match() {
        let outputs = bip143_outputs();
        let ctx = SpendingContext::for_outputs(Amount::from_sat(1), &outputs);
        assert!(enforce(&outputs, &ctx).is_ok());

        let err = enforce(&outputs[..1], &ctx).unwrap_err();
        assert!(matches!(err, ContractError::OutputCommitmentMismatch { .. }));
    }

    #[test]
    fn test_enforce_with_declared_change() {
        let outputs = bip143_outputs();
        let ctx = SpendingContext::for_outputs(Amount::from_sat(1), &outputs)
            .with_change(outputs[1].clone());
        assert!(enforce(&outputs[..1], &ctx).is_ok());
        assert!(enforce(&outputs, &ctx).is_err());
    }

    #[test]
    fn test_enforce_exact_refuses_change() {
        let outputs = bip143_outputs();
        let ctx = SpendingContext::for_outputs(Amount::from_sat(1), &outputs)
            .with_change(outputs[1].clone());
        assert!(enforce(&outputs[..1], &ctx).is_ok());
        assert!(matches!(
            enforce_exact(&outputs[..1], &ctx),
            Err(ContractError::OutputCommitmentMismatch { .. })
        ));

        let ctx = SpendingContext::for_outputs(Amount::from_sat(1), &outputs[..1]);
        assert!(enforce_exact(&outputs[..1], &ctx).is_ok());
    }

    #[test]
    fn test_context_from_transaction() {
        let outputs = bip143_outputs();
        let tx = spending_tx(&outputs);
        let script_code = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([7u8; 20]));
        let value = Amount::from_sat(600_000_000);

        let ctx = SpendingContext::from_transaction(&tx, 0, &script_code, value).unwrap();
        assert_eq!(ctx.utxo_value, value);
        assert_eq!(ctx.hash_outputs, canonical_hash(&outputs));
        assert_ne!(ctx.sighash, [0u8; 32]);

        // sighash commits to the outputs
        let other = SpendingContext::from_transaction(&spending_tx(&outputs[..1]), 0, &script_code, value)
            .unwrap();
        assert_ne!(ctx.sighash, other.sighash);

        assert!(SpendingContext::from_transaction(&tx, 5, &script_code, value).is_err());
    }

    #[test]
    fn test_digest_hex_round_trip() {
        let digest = canonical_hash(&bip143_outputs());
        assert_eq!(parse_digest(&digest_hex(&digest)).unwrap(), digest);
        assert!(parse_digest("abcd").is_err());
    }
}
