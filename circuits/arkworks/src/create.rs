//! Create Circuit - leaf of the proof tree
//!
//! Proves a single value-addition is within its cap.
//!
//! # Public Inputs
//! - `value`: units being added (also the public output)
//! - `limit`: cap the value was checked against
//!
//! # Circuit Constraints
//! 1. Range check: value in [0, 2^64)
//! 2. Range check: limit in [0, 2^64)
//! 3. Comparison: value < limit
//! 4. Comparison: value > 0
//!
//! The private input and the public output are the same `AddValue`, so the
//! witness is fully determined by the public inputs. What the proof attests
//! is that the pair satisfied the cap when it was created.

use ark_ff::PrimeField;
use ark_r1cs_std::{alloc::AllocVar, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_std::marker::PhantomData;

use crate::gadgets::{enforce_less_than, enforce_positive, enforce_u64};
use crate::value::AddValue;

/// Leaf circuit for a single `AddValue`
#[derive(Clone)]
pub struct CreateCircuit<F: PrimeField> {
    /// The statement; `None` during key generation
    pub add_value: Option<AddValue>,
    _marker: PhantomData<F>,
}

impl<F: PrimeField> CreateCircuit<F> {
    /// Create a new circuit
    pub fn new(add_value: AddValue) -> Self {
        Self {
            add_value: Some(add_value),
            _marker: PhantomData,
        }
    }

    /// Create empty circuit for setup
    pub fn empty() -> Self {
        Self {
            add_value: None,
            _marker: PhantomData,
        }
    }

    /// Public inputs in allocation order
    pub fn public_inputs(add_value: &AddValue) -> Vec<F> {
        add_value.to_field_elements::<F>().to_vec()
    }
}

impl<F: PrimeField> ConstraintSynthesizer<F> for CreateCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let add_value = self.add_value;

        // ======== Allocate Public Inputs ========

        let value = FpVar::new_input(cs.clone(), || {
            add_value
                .map(|a| F::from(a.value))
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let limit = FpVar::new_input(cs.clone(), || {
            add_value
                .map(|a| F::from(a.limit))
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        // ======== Constraint 1-2: Range Checks ========
        enforce_u64(cs.clone(), &value)?;
        enforce_u64(cs.clone(), &limit)?;

        // ======== Constraint 3: value < limit ========
        enforce_less_than(cs.clone(), &value, &limit)?;

        // ======== Constraint 4: value > 0 ========
        enforce_positive(cs, &value)?;

        Ok(())
    }
}
