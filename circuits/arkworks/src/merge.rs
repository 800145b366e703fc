//! Merge Circuit - internal node of the proof tree
//!
//! Proves an aggregate `AddValue` is the sum of two children created under
//! the same limit. The children's own proofs are verified natively against
//! the public inputs below before this circuit is proven, and again by
//! anyone verifying the tree.
//!
//! # Public Inputs
//! - `left.value`, `left.limit`
//! - `right.value`, `right.limit`
//! - `out.value`, `out.limit`
//!
//! # Circuit Constraints
//! 1. `left.limit == right.limit`
//! 2. `out.limit == left.limit`
//! 3. `out.value == left.value + right.value`
//! 4. Range check: out.value in [0, 2^64)
//!
//! `out.value` is not compared against the limit; the cap bounds each leaf,
//! not the aggregate.

use ark_ff::PrimeField;
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_std::marker::PhantomData;

use crate::gadgets::enforce_u64;
use crate::value::AddValue;

/// Witness for one merge step
#[derive(Clone, Copy, Debug)]
pub struct MergeWitness {
    pub left: AddValue,
    pub right: AddValue,
    pub out: AddValue,
}

/// Internal-node circuit
#[derive(Clone)]
pub struct MergeCircuit<F: PrimeField> {
    pub witness: Option<MergeWitness>,
    _marker: PhantomData<F>,
}

impl<F: PrimeField> MergeCircuit<F> {
    /// Create a new circuit
    pub fn new(left: AddValue, right: AddValue, out: AddValue) -> Self {
        Self {
            witness: Some(MergeWitness { left, right, out }),
            _marker: PhantomData,
        }
    }

    /// Create empty circuit for setup
    pub fn empty() -> Self {
        Self {
            witness: None,
            _marker: PhantomData,
        }
    }

    /// Public inputs in allocation order
    pub fn public_inputs(left: &AddValue, right: &AddValue, out: &AddValue) -> Vec<F> {
        [left, right, out]
            .iter()
            .flat_map(|a| a.to_field_elements::<F>())
            .collect()
    }

    fn input(
        cs: &ConstraintSystemRef<F>,
        witness: Option<MergeWitness>,
        select: impl Fn(&MergeWitness) -> u64,
    ) -> Result<FpVar<F>, SynthesisError> {
        FpVar::new_input(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| F::from(select(w)))
                .ok_or(SynthesisError::AssignmentMissing)
        })
    }
}

impl<F: PrimeField> ConstraintSynthesizer<F> for MergeCircuit<F> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let w = self.witness;

        // ======== Allocate Public Inputs (order matters) ========
        let left_value = Self::input(&cs, w, |w| w.left.value)?;
        let left_limit = Self::input(&cs, w, |w| w.left.limit)?;
        let right_value = Self::input(&cs, w, |w| w.right.value)?;
        let right_limit = Self::input(&cs, w, |w| w.right.limit)?;
        let out_value = Self::input(&cs, w, |w| w.out.value)?;
        let out_limit = Self::input(&cs, w, |w| w.out.limit)?;

        // ======== Constraint 1-2: shared limit ========
        left_limit.enforce_equal(&right_limit)?;
        out_limit.enforce_equal(&left_limit)?;

        // ======== Constraint 3: sum ========
        let sum = &left_value + &right_value;
        out_value.enforce_equal(&sum)?;

        // ======== Constraint 4: aggregate stays a u64 ========
        enforce_u64(cs, &out_value)?;

        Ok(())
    }
}
