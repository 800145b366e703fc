//! Range and comparison gadgets over R1CS
//!
//! All comparisons reduce to a single primitive: "x fits in 64 bits".
//!
//! # Strategy
//! 1. Witness 64 boolean limbs of x (little-endian)
//! 2. Recompose them into a field element and enforce equality with x
//! 3. If x >= 2^64 (including every "negative" field element p - k),
//!    no such limbs exist and the system is unsatisfiable
//!
//! For operands that already fit in 64 bits:
//! - `a < b`  <=>  `b - a - 1` fits in 64 bits
//! - `a > 0`  <=>  `a - 1` fits in 64 bits
//!
//! Cost: 64 boolean constraints + 1 equality per range check.

use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::{alloc::AllocVar, boolean::Boolean, eq::EqGadget, fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Width of every value, limit and aggregate
pub const VALUE_BITS: usize = 64;

/// Enforce `0 <= var < 2^64`
pub fn enforce_u64<F: PrimeField>(
    cs: ConstraintSystemRef<F>,
    var: &FpVar<F>,
) -> Result<(), SynthesisError> {
    // Unknown during setup; the closures below are never called then
    let native_bits = var.value().ok().map(|v| v.into_bigint().to_bits_le());

    let bits = (0..VALUE_BITS)
        .map(|i| {
            Boolean::new_witness(cs.clone(), || {
                native_bits
                    .as_ref()
                    .map(|bits| bits[i])
                    .ok_or(SynthesisError::AssignmentMissing)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let recomposed = Boolean::le_bits_to_fp_var(&bits)?;
    recomposed.enforce_equal(var)
}

/// Enforce `a < b` for 64-bit operands
pub fn enforce_less_than<F: PrimeField>(
    cs: ConstraintSystemRef<F>,
    a: &FpVar<F>,
    b: &FpVar<F>,
) -> Result<(), SynthesisError> {
    let gap = b - a - FpVar::one();
    enforce_u64(cs, &gap)
}

/// Enforce `a > 0` for a 64-bit operand
pub fn enforce_positive<F: PrimeField>(
    cs: ConstraintSystemRef<F>,
    a: &FpVar<F>,
) -> Result<(), SynthesisError> {
    let predecessor = a - FpVar::one();
    enforce_u64(cs, &predecessor)
}
