//! Ledger Models
//!
//! Records held by the sub-ledger store.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, AddValueEvent, TokenId};

/// A deployed contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: AccountId,

    /// Sub-ledger this contract mints into
    pub token_id: TokenId,

    /// Persisted fields, indexed by `StateField::index`
    pub fields: Vec<u64>,

    /// Fingerprint of the verification keys the contract was deployed with
    pub vk_fingerprint: String,

    pub network: String,
}

impl ContractRecord {
    pub fn field(&self, index: usize) -> Option<u64> {
        self.fields.get(index).copied()
    }
}

/// An event with its position in the global log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonically increasing, starting at 0
    pub sequence: u64,
    pub contract: AccountId,
    pub event: AddValueEvent,
}
