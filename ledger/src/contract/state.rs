//! Persisted contract fields and freshness witnesses
//!
//! A read of a persisted field yields a `Witnessed` value. Calls that depend
//! on the read take the witness back, and the commit re-checks it against
//! the live field under the store's write lock.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{LedgerError, LedgerResult};
use crate::types::AccountId;

const WITNESS_DOMAIN: &[u8] = b"capped-value/field-witness/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    U64,
}

/// Schema entry for one persisted contract field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateField {
    pub name: &'static str,
    pub index: usize,
    pub ty: FieldType,
    /// Calls reading this field must prove their read is current
    pub requires_fresh: bool,
}

/// Cap applied to every `create`; written once at deploy
pub const LIMIT: StateField = StateField {
    name: "limit",
    index: 0,
    ty: FieldType::U64,
    requires_fresh: true,
};

pub const SCHEMA: &[StateField] = &[LIMIT];

/// A field value together with where it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witnessed<T> {
    value: T,
    contract: AccountId,
    field: usize,
    #[serde(with = "commitment_hex")]
    commitment: [u8; 32],
}

impl Witnessed<u64> {
    pub(crate) fn new(contract: AccountId, field: &StateField, value: u64) -> Self {
        Self {
            value,
            contract,
            field: field.index,
            commitment: commit(&contract, field.index, value),
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn contract(&self) -> &AccountId {
        &self.contract
    }

    pub fn field_index(&self) -> usize {
        self.field
    }

    /// The witness must come from `field` of `contract` and be internally
    /// consistent; the live comparison happens at commit.
    pub(crate) fn check_origin(&self, contract: &AccountId, field: &StateField) -> LedgerResult<()> {
        if self.contract != *contract || self.field != field.index {
            return Err(LedgerError::StaleState(format!(
                "witness for field {} of {} used for field {} of {}",
                self.field, self.contract, field.index, contract
            )));
        }
        if self.commitment != commit(&self.contract, self.field, self.value) {
            return Err(LedgerError::StaleState(format!(
                "witness commitment does not match value {}",
                self.value
            )));
        }
        Ok(())
    }
}

fn commit(contract: &AccountId, field: usize, value: u64) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(WITNESS_DOMAIN);
    hasher.update(contract.as_bytes());
    hasher.update((field as u64).to_le_bytes());
    hasher.update(value.to_le_bytes());
    hasher.finalize().into()
}

mod commitment_hex {
    use std::convert::TryFrom;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}
