//! The `AddValue` statement shared by both circuits and the ledger.

use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};

use crate::error::{validation, CircuitResult};

/// A value-addition fact: `value` units, created under cap `limit`.
///
/// The invariant `0 < value < limit` only holds for leaves produced by
/// `create`; an aggregate from `merge` carries the summed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddValue {
    pub value: u64,
    pub limit: u64,
}

impl AddValue {
    pub fn new(value: u64, limit: u64) -> Self {
        Self { value, limit }
    }

    /// Check the `create` precondition without building a circuit.
    pub fn validate(&self) -> CircuitResult<()> {
        validation::validate_add_value(self.value, self.limit)
    }

    /// Raw slot encoding: `[value, limit]`.
    pub fn to_state(&self) -> [u64; 2] {
        [self.value, self.limit]
    }

    /// Public-input encoding, in slot order.
    pub fn to_field_elements<F: PrimeField>(&self) -> [F; 2] {
        [F::from(self.value), F::from(self.limit)]
    }
}
