//! Attestation Service
//!
//! Delivers a signed contract call and reports whether it was included.
//! `LocalAttestation` executes calls against in-process contracts; a network
//! implementation would submit the same `ContractCall` as a transaction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use capped_value_circuits::{AddValue, Proof};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::auth::{Authorization, CallDigest, Method};
use crate::contract::{AddContract, Witnessed};
use crate::db::EventRecord;
use crate::error::LedgerError;
use crate::types::{AccountId, AddValueEvent};

/// Call arguments per entry point
#[derive(Debug, Clone)]
pub enum CallPayload {
    AddOne { add_value: AddValue },
    AddMany { proof: Proof },
}

impl CallPayload {
    pub fn method(&self) -> Method {
        match self {
            CallPayload::AddOne { .. } => Method::AddOne,
            CallPayload::AddMany { .. } => Method::AddMany,
        }
    }

    /// The `AddValue` the caller signs over
    pub fn add_value(&self) -> AddValue {
        match self {
            CallPayload::AddOne { add_value } => *add_value,
            CallPayload::AddMany { proof } => proof.public_output(),
        }
    }
}

/// A fully authorized contract call
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub contract: AccountId,
    pub address: AccountId,
    pub payload: CallPayload,
    pub limit: Witnessed<u64>,
    pub authorization: Authorization,
}

impl ContractCall {
    pub fn digest(&self) -> CallDigest {
        CallDigest::new(
            &self.contract,
            self.payload.method(),
            &self.address,
            &self.payload.add_value(),
        )
    }
}

/// Outcome of a submitted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionReceipt {
    Included {
        tx_hash: String,
        sequence: u64,
        event: AddValueEvent,
    },
    Rejected {
        tx_hash: String,
        code: String,
        reason: String,
    },
}

impl TransactionReceipt {
    pub fn is_included(&self) -> bool {
        matches!(self, TransactionReceipt::Included { .. })
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            TransactionReceipt::Included { tx_hash, .. }
            | TransactionReceipt::Rejected { tx_hash, .. } => tx_hash,
        }
    }
}

/// Submits calls and reports their fate
pub trait AttestationService: Send + Sync {
    fn submit(&self, call: ContractCall) -> impl Future<Output = TransactionReceipt> + Send;
}

/// Executes calls against contracts living in this process
#[derive(Default)]
pub struct LocalAttestation {
    contracts: HashMap<AccountId, Arc<AddContract>>,
    nonce: AtomicU64,
}

impl LocalAttestation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, contract: Arc<AddContract>) {
        self.contracts.insert(*contract.address(), contract);
    }

    fn tx_hash(digest: &CallDigest, nonce: u64) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(digest.as_bytes());
        hasher.update(nonce.to_le_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    fn execute(contract: &AddContract, call: ContractCall) -> Result<EventRecord, LedgerError> {
        match call.payload {
            CallPayload::AddOne { add_value } => {
                contract.add_one(&call.address, add_value, &call.limit, &call.authorization)
            }
            CallPayload::AddMany { proof } => {
                contract.add_many(&call.address, &proof, &call.limit, &call.authorization)
            }
        }
    }
}

impl AttestationService for LocalAttestation {
    async fn submit(&self, call: ContractCall) -> TransactionReceipt {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx_hash = Self::tx_hash(&call.digest(), nonce);
        let method = call.payload.method();

        let result = match self.contracts.get(&call.contract) {
            None => Err(LedgerError::UnknownContract(call.contract)),
            Some(contract) => {
                // Proof verification is CPU-bound
                let contract = contract.clone();
                tokio::task::spawn_blocking(move || Self::execute(&contract, call))
                    .await
                    .map_err(LedgerError::from)
                    .and_then(|result| result)
            }
        };

        match result {
            Ok(record) => {
                tracing::info!(%tx_hash, %method, sequence = record.sequence, "Transaction included");
                TransactionReceipt::Included {
                    tx_hash,
                    sequence: record.sequence,
                    event: record.event,
                }
            }
            Err(err) => {
                tracing::warn!(%tx_hash, %method, code = err.code(), "Transaction rejected: {}", err);
                TransactionReceipt::Rejected {
                    tx_hash,
                    code: err.code().to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }
}
