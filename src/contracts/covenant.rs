//! # Covenant State Machine
//!
//! Generic carry-forward pattern for contracts whose state lives in their own
//! locking script. Spending an instance must either recreate it with an allowed
//! state change (a successor) or release the funds (a payout). The contract proves
//! which one happened by recomputing the expected outputs and comparing their
//! digest with the one the spending transaction commits to.
//!
//! ## Locking Descriptor
//!
//! ```text
//! <template id: 32 bytes> OP_RETURN <state field>*
//! ```
//!
//! The template id names the locking logic and never changes between an instance
//! and its successors; the pushes after `OP_RETURN` are the serialized state.
//! A successor is a plain value computed from the current one, never a reference
//! back to it.

use crate::commitment::{self, ExpectedOutput, SpendingContext};
use crate::error::{ContractError, ContractResult};
use bitcoin::{
    opcodes::all::OP_RETURN,
    script::{Builder, Instruction, PushBytes},
    Amount, Script, ScriptBuf, TxOut,
};
use std::fmt;

/// State persisted in a covenant's locking script
pub trait CovenantState: Clone + PartialEq + fmt::Debug {
    /// Identifies the locking logic; shared by every instance of one contract
    const TEMPLATE_ID: [u8; 32];

    /// State fields in push order
    fn encode_state(&self) -> Vec<Vec<u8>>;

    /// Inverse of [`CovenantState::encode_state`]
    fn decode_state(fields: &[&[u8]]) -> ContractResult<Self>;
}

/// Build the locking script carrying `state`
pub fn locking_script<S: CovenantState>(state: &S) -> ContractResult<ScriptBuf> {
    let mut builder = Builder::new()
        .push_slice(S::TEMPLATE_ID)
        .push_opcode(OP_RETURN);

    for field in state.encode_state() {
        let push = <&PushBytes>::try_from(field.as_slice())
            .map_err(|_| ContractError::state("state field too large to push"))?;
        builder = builder.push_slice(push);
    }

    Ok(builder.into_script())
}

/// Read the persisted state out of a covenant locking script
pub fn read_state<S: CovenantState>(script: &Script) -> ContractResult<S> {
    let mut instructions = script.instructions();

    match instructions.next() {
        Some(Ok(Instruction::PushBytes(id))) if id.as_bytes() == S::TEMPLATE_ID.as_slice() => {}
        _ => return Err(ContractError::state("unknown covenant template")),
    }
    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_RETURN => {}
        _ => return Err(ContractError::state("missing state separator")),
    }

    let mut fields = Vec::new();
    for instruction in instructions {
        match instruction.map_err(|e| ContractError::state(format!("unparseable state: {}", e)))? {
            Instruction::PushBytes(bytes) => fields.push(bytes.as_bytes()),
            Instruction::Op(op) => {
                return Err(ContractError::state(format!("unexpected {} in state", op)))
            }
        }
    }

    S::decode_state(&fields)
}

/// One unspent covenant output: its state and the balance backing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovenantInstance<S> {
    pub state: S,
    pub balance: Amount,
}

impl<S: CovenantState> CovenantInstance<S> {
    pub fn new(state: S, balance: Amount) -> Self {
        Self { state, balance }
    }

    /// Instance currently held by a ledger output
    pub fn from_output(output: &TxOut) -> ContractResult<Self> {
        Ok(Self {
            state: read_state(&output.script_pubkey)?,
            balance: output.value,
        })
    }

    pub fn locking_script(&self) -> ContractResult<ScriptBuf> {
        locking_script(&self.state)
    }

    /// The output that holds this instance
    pub fn to_output(&self) -> ContractResult<ExpectedOutput> {
        Ok(commitment::build(self.locking_script()?, self.balance))
    }

    /// Starting point for the successor's state
    pub fn next(&self) -> S {
        self.state.clone()
    }

    /// Apply `transition` to a copy of the state and require the spending
    /// transaction to create exactly the resulting successor with `next_balance`.
    pub fn advance<F>(
        &self,
        ctx: &SpendingContext,
        next_balance: Amount,
        transition: F,
    ) -> ContractResult<CovenantInstance<S>>
    where
        F: FnOnce(&mut S) -> ContractResult<()>,
    {
        let mut state = self.next();
        transition(&mut state)?;

        let successor = CovenantInstance::new(state, next_balance);
        commitment::enforce(&[successor.to_output()?], ctx)?;
        log::debug!("Covenant successor committed: {:?}", successor.state);
        Ok(successor)
    }

    /// Require the spending transaction to release the funds as `payout`, with no successor
    pub fn release(&self, payout: &[ExpectedOutput], ctx: &SpendingContext) -> ContractResult<()> {
        commitment::enforce(payout, ctx)?;
        log::debug!("Covenant released {} to {} output(s)", self.balance, payout.len());
        Ok(())
    }
}
