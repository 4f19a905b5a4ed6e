//! # Stateful Multi-Signature Covenant
//!
//! M registered participants, N signatures required. Each spend before the
//! threshold adds exactly one participant's signature and recreates the covenant
//! with that participant's flag set; once N flags are set the only valid spend
//! pays the full balance to the fixed destination.
//!
//! ```text
//! Collecting(0) ─add─> Collecting(1) ─add─> … ─add─> Payable(N) ─pay─> destination
//! ```
//!
//! Flags are never cleared, and an already-set flag cannot be set again. Whoever
//! builds the spending transaction controls everything except the participants'
//! keys; the output commitment check takes away every other degree of freedom.

use crate::commitment::{self, ExpectedOutput, SpendingContext};
use crate::contracts::covenant::{CovenantInstance, CovenantState};
use crate::error::{ContractError, ContractResult};
use bitcoin::{
    ecdsa,
    hashes::Hash,
    script::Instruction,
    secp256k1::{Message, Secp256k1},
    sighash::EcdsaSighashType,
    Amount, PubkeyHash, PublicKey, Script,
};

/// First 30 bytes of the multisig template id; the last two carry M and N
const TEMPLATE_PREFIX: [u8; 30] = [
    0x5c, 0xd8, 0x8a, 0x34, 0x03, 0x6c, 0xde, 0x98, 0xd3, 0x3f, 0xe6, 0x23, 0xa4, 0x69, 0xdb,
    0x17, 0x70, 0x4d, 0x38, 0xdd, 0xe2, 0x43, 0x8d, 0x62, 0x13, 0xda, 0xc9, 0x17, 0x6e, 0xfc,
];

const fn template_id(m: usize, n: usize) -> [u8; 32] {
    let mut id = [0u8; 32];
    let mut i = 0;
    while i < TEMPLATE_PREFIX.len() {
        id[i] = TEMPLATE_PREFIX[i];
        i += 1;
    }
    id[30] = m as u8;
    id[31] = n as u8;
    id
}

/// Read M and N from the template id at the head of a multisig locking script,
/// without decoding the state.
pub fn template_params(script: &Script) -> ContractResult<(usize, usize)> {
    match script.instructions().next() {
        Some(Ok(Instruction::PushBytes(id)))
            if id.len() == 32 && id.as_bytes()[..30] == TEMPLATE_PREFIX =>
        {
            Ok((id.as_bytes()[30] as usize, id.as_bytes()[31] as usize))
        }
        _ => Err(ContractError::state("not a stateful multisig covenant")),
    }
}

/// Where a multisig covenant stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Still accepting signatures
    Collecting { have: usize, need: usize },
    /// Threshold reached, only the payout is valid
    Payable,
}

/// M-of-N covenant state. `dest_pkh` and `pub_keys` never change; `validated`
/// only ever gains `true` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatefulMultiSig<const M: usize, const N: usize> {
    dest_pkh: PubkeyHash,
    pub_keys: [PublicKey; M],
    validated: [bool; M],
}

/// The 3-participant, 2-signature covenant
pub type DefaultMultiSig =
    StatefulMultiSig<{ crate::config::multisig::DEFAULT_M }, { crate::config::multisig::DEFAULT_N }>;

impl<const M: usize, const N: usize> StatefulMultiSig<M, N> {
    /// Fresh covenant with no signatures collected
    pub fn new(dest_pkh: PubkeyHash, pub_keys: [PublicKey; M]) -> ContractResult<Self> {
        Self::with_validated(dest_pkh, pub_keys, [false; M])
    }

    /// Covenant at an arbitrary point of its lifetime
    pub fn with_validated(
        dest_pkh: PubkeyHash,
        pub_keys: [PublicKey; M],
        validated: [bool; M],
    ) -> ContractResult<Self> {
        if N == 0 || N > M || M > u8::MAX as usize {
            return Err(ContractError::config(format!(
                "Invalid threshold: need 0 < N <= M <= 255, got N={} M={}",
                N, M
            )));
        }
        for (i, key) in pub_keys.iter().enumerate() {
            if pub_keys[..i].contains(key) {
                return Err(ContractError::config(format!(
                    "Public key {} registered twice",
                    key
                )));
            }
        }

        let multisig = Self {
            dest_pkh,
            pub_keys,
            validated,
        };
        if multisig.true_count() > N {
            return Err(ContractError::state(format!(
                "{} flags set but threshold is {}",
                multisig.true_count(),
                N
            )));
        }
        Ok(multisig)
    }

    pub fn dest_pkh(&self) -> &PubkeyHash {
        &self.dest_pkh
    }

    pub fn pub_keys(&self) -> &[PublicKey; M] {
        &self.pub_keys
    }

    pub fn validated(&self) -> &[bool; M] {
        &self.validated
    }

    pub fn true_count(&self) -> usize {
        self.validated.iter().filter(|v| **v).count()
    }

    pub fn phase(&self) -> Phase {
        let have = self.true_count();
        if have >= N {
            Phase::Payable
        } else {
            Phase::Collecting { have, need: N }
        }
    }

    /// Check that `index` can still be validated, returning it on success
    pub fn check_index(&self, index: usize) -> ContractResult<usize> {
        match self.validated.get(index) {
            Some(false) => Ok(index),
            _ => Err(ContractError::InvalidIndexOrAlreadySet { index }),
        }
    }

    /// State after validating `index`, without any signature check.
    /// Wallets use it to build the successor output before asking for signatures.
    pub fn next_with(&self, index: usize) -> ContractResult<Self> {
        self.check_index(index)?;
        let mut next = self.clone();
        next.validated[index] = true;
        Ok(next)
    }

    /// Output the spending transaction of an `add` must create
    pub fn expected_add_output(&self, index: usize, balance: Amount) -> ContractResult<ExpectedOutput> {
        CovenantInstance::new(self.next_with(index)?, balance).to_output()
    }

    /// Output the spending transaction of a `pay` must create
    pub fn expected_pay_output(&self, balance: Amount) -> ExpectedOutput {
        commitment::p2pkh(&self.dest_pkh, balance)
    }

    /// Record participant `index`'s signature over the spending transaction.
    ///
    /// The spending transaction must create the successor covenant holding
    /// `next_balance` (the current balance when `None`). Returns the successor state.
    pub fn add(
        &self,
        index: usize,
        signature: &ecdsa::Signature,
        ctx: &SpendingContext,
        next_balance: Option<Amount>,
    ) -> ContractResult<Self> {
        self.check_index(index)?;
        if self.phase() == Phase::Payable {
            log::warn!("Rejecting add at index {}: threshold already reached", index);
            return Err(ContractError::ThresholdAlreadyReached { need: N });
        }

        self.check_sig(index, signature, ctx)?;

        let instance = CovenantInstance::new(self.clone(), ctx.utxo_value);
        let successor = instance.advance(ctx, next_balance.unwrap_or(ctx.utxo_value), |state| {
            state.validated[index] = true;
            Ok(())
        })?;

        log::info!(
            "Participant {} validated ({}/{} signatures)",
            index,
            successor.state.true_count(),
            N
        );
        Ok(successor.state)
    }

    /// Release the full balance to the destination once the threshold is reached
    pub fn pay(&self, ctx: &SpendingContext) -> ContractResult<ExpectedOutput> {
        let have = self.true_count();
        if have < N {
            log::warn!("Not enough valid signatures: {}/{}", have, N);
            return Err(ContractError::ThresholdNotReached { have, need: N });
        }

        let payout = self.expected_pay_output(ctx.utxo_value);
        CovenantInstance::new(self.clone(), ctx.utxo_value).release(&[payout.clone()], ctx)?;
        log::info!("Multisig covenant paid {} to {}", ctx.utxo_value, self.dest_pkh);
        Ok(payout)
    }

    fn check_sig(
        &self,
        index: usize,
        signature: &ecdsa::Signature,
        ctx: &SpendingContext,
    ) -> ContractResult<()> {
        if signature.sighash_type != EcdsaSighashType::All {
            log::warn!("Signature for participant {} is not SIGHASH_ALL", index);
            return Err(ContractError::SignatureCheckFailed { index });
        }

        let secp = Secp256k1::verification_only();
        let message = Message::from_digest(ctx.sighash);
        secp.verify_ecdsa(&message, &signature.signature, &self.pub_keys[index].inner)
            .map_err(|e| {
                log::warn!("signature check failed for participant {}: {}", index, e);
                ContractError::SignatureCheckFailed { index }
            })
    }
}

impl<const M: usize, const N: usize> CovenantState for StatefulMultiSig<M, N> {
    const TEMPLATE_ID: [u8; 32] = template_id(M, N);

    /// `dest_pkh`, each public key, then one byte per flag
    fn encode_state(&self) -> Vec<Vec<u8>> {
        let mut fields = Vec::with_capacity(M + 2);
        fields.push(self.dest_pkh.to_byte_array().to_vec());
        for key in &self.pub_keys {
            fields.push(key.to_bytes());
        }
        fields.push(self.validated.iter().map(|v| u8::from(*v)).collect());
        fields
    }

    fn decode_state(fields: &[&[u8]]) -> ContractResult<Self> {
        if fields.len() != M + 2 {
            return Err(ContractError::state(format!(
                "expected {} fields, got {}",
                M + 2,
                fields.len()
            )));
        }

        let dest: [u8; 20] = fields[0]
            .try_into()
            .map_err(|_| ContractError::state("destination must be 20 bytes"))?;

        let mut keys = Vec::with_capacity(M);
        for field in &fields[1..=M] {
            let key = PublicKey::from_slice(field)
                .map_err(|e| ContractError::state(format!("invalid public key: {}", e)))?;
            keys.push(key);
        }
        let pub_keys: [PublicKey; M] = keys
            .try_into()
            .map_err(|_| ContractError::state("public key count mismatch"))?;

        let flags = fields[M + 1];
        if flags.len() != M {
            return Err(ContractError::state(format!(
                "expected {} flags, got {}",
                M,
                flags.len()
            )));
        }
        let mut validated = [false; M];
        for (slot, byte) in validated.iter_mut().zip(flags) {
            *slot = match byte {
                0 => false,
                1 => true,
                other => return Err(ContractError::state(format!("invalid flag byte {}", other))),
            };
        }

        Self::with_validated(PubkeyHash::from_byte_array(dest), pub_keys, validated)
    }
}
