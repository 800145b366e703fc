//! The value-accumulation program: `create` and `merge` over shared keys.

use std::sync::Arc;

use ark_groth16::Groth16;
use ark_serialize::CanonicalSerialize;
use ark_snark::SNARK;
use rand::{CryptoRng, RngCore};

use crate::create::CreateCircuit;
use crate::error::{validation, CircuitError, CircuitResult};
use crate::keys::{Curve, ProgramKeys, Scalar, VerificationKeys};
use crate::merge::MergeCircuit;
use crate::proof::Proof;
use crate::value::AddValue;

/// Proves leaves and merges proof trees under one set of keys
#[derive(Clone, Debug)]
pub struct ValueProgram {
    keys: Arc<ProgramKeys>,
}

impl ValueProgram {
    pub fn new(keys: Arc<ProgramKeys>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &Arc<ProgramKeys> {
        &self.keys
    }

    pub fn verification_keys(&self) -> &VerificationKeys {
        self.keys.verification_keys()
    }

    /// Prove a single `AddValue` with `0 < value < limit`
    pub fn create<R: RngCore + CryptoRng>(
        &self,
        add_value: AddValue,
        rng: &mut R,
    ) -> CircuitResult<Proof> {
        add_value.validate()?;

        let circuit = CreateCircuit::<Scalar>::new(add_value);
        let snark = Groth16::<Curve>::prove(self.keys.create_pk(), circuit, rng)?;

        tracing::debug!(
            value = add_value.value,
            limit = add_value.limit,
            "Leaf proof generated"
        );
        Ok(Proof::leaf(add_value, to_bytes(&snark)?))
    }

    /// Combine two verified proofs sharing a limit into one whose output is
    /// their sum
    pub fn merge<R: RngCore + CryptoRng>(
        &self,
        left: &Proof,
        right: &Proof,
        rng: &mut R,
    ) -> CircuitResult<Proof> {
        let vks = self.keys.verification_keys();
        let l = left.verify(vks)?;
        let r = right.verify(vks)?;

        validation::validate_same_limit(l.limit, r.limit)?;
        let out = AddValue::new(validation::checked_sum(l.value, r.value)?, l.limit);

        let circuit = MergeCircuit::<Scalar>::new(l, r, out);
        let snark = Groth16::<Curve>::prove(self.keys.merge_pk(), circuit, rng)?;

        tracing::debug!(
            left = l.value,
            right = r.value,
            out = out.value,
            limit = out.limit,
            "Merge proof generated"
        );
        Ok(Proof::merged(left, right, out, to_bytes(&snark)?))
    }

    /// Fold proofs pairwise, level by level, into a single root
    pub fn aggregate<R: RngCore + CryptoRng>(
        &self,
        proofs: Vec<Proof>,
        rng: &mut R,
    ) -> CircuitResult<Proof> {
        let mut level = proofs;
        if level.is_empty() {
            return Err(CircuitError::ConstraintViolation {
                reason: "Nothing to aggregate".to_string(),
            });
        }

        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            let mut iter = level.into_iter();
            while let Some(left) = iter.next() {
                match iter.next() {
                    Some(right) => next.push(self.merge(&left, &right, rng)?),
                    None => next.push(left),
                }
            }
            level = next;
        }

        Ok(level.remove(0))
    }

    pub fn verify(&self, proof: &Proof) -> CircuitResult<AddValue> {
        proof.verify(self.keys.verification_keys())
    }
}

fn to_bytes<T: CanonicalSerialize>(snark: &T) -> CircuitResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(snark.compressed_size());
    snark.serialize_compressed(&mut bytes)?;
    Ok(bytes)
}
