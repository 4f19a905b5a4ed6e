//! Batch settlement verification.
//!
//! Each request is checked independently against the same bet. Verification is
//! CPU-bound (a 1024-bit modular square per request), so requests run on tokio's
//! blocking pool; results come back in request order.

use crate::commitment::{self, SpendingContext};
use crate::contracts::{PriceBet, Settlement};
use crate::error::{ContractError, ContractResult};
use crate::oracle::RabinSignature;
use crate::utils::serde_hex;
use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinError;

/// One settlement attempt, as stored in a requests file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    /// Raw oracle message
    #[serde(with = "serde_hex")]
    pub message: Vec<u8>,
    pub signature: RabinSignature,
    /// Value of the bet output in satoshis
    pub utxo_value: u64,
    /// `hashOutputs` of the spending transaction, hex
    pub hash_outputs: String,
}

impl SettlementRequest {
    pub fn context(&self) -> ContractResult<SpendingContext> {
        Ok(SpendingContext::new(
            Amount::from_sat(self.utxo_value),
            commitment::parse_digest(&self.hash_outputs)?,
        ))
    }

    fn verify(&self, bet: &PriceBet) -> ContractResult<Settlement> {
        bet.settle(&self.message, &self.signature, &self.context()?)
    }
}

/// Load a JSON array of requests
pub fn load_requests(filename: &str) -> ContractResult<Vec<SettlementRequest>> {
    let json = std::fs::read_to_string(filename)?;
    Ok(serde_json::from_str(&json)?)
}

/// Verify every request against `bet`, one blocking task per request
pub async fn verify_settlements(
    bet: &PriceBet,
    requests: Vec<SettlementRequest>,
) -> Vec<ContractResult<Settlement>> {
    let bet = Arc::new(bet.clone());
    log::info!("Verifying {} settlement request(s)", requests.len());

    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let bet = Arc::clone(&bet);
            tokio::task::spawn_blocking(move || request.verify(&bet))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap_or_else(|e| Err(task_failed(i, e)));
        results.push(result);
    }
    results
}

/// A panicked or cancelled task says nothing about the transaction
fn task_failed(index: usize, error: JoinError) -> ContractError {
    log::error!("Verification task {} failed: {}", index, error);
    ContractError::TaskFailed {
        message: format!("request {}: {}", index, error),
    }
}
