//! Prover Service
//!
//! Async front of `ValueProgram`. Groth16 proving is CPU-bound, so every
//! prove call runs on tokio's blocking pool; independent leaves and sibling
//! merges run concurrently.
//!
//! # Aggregation (fork-join)
//! ```text
//! level 0:  p0   p1   p2   p3   p4
//!            \   /     \   /    |
//! level 1:   m01       m23     p4      (pairs merged concurrently)
//!               \     /        |
//! level 2:       m0123        p4
//!                     \      /
//! level 3:             root
//! ```
//! An odd proof out is carried up unchanged.

use std::sync::Arc;

use capped_value_circuits::{AddValue, ProgramKeys, Proof, ValueProgram, VerificationKeys};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;
use crate::error::{LedgerError, LedgerResult};

/// Proving service over one immutable key set
#[derive(Clone, Debug)]
pub struct ProverService {
    program: ValueProgram,
}

impl ProverService {
    pub fn new(keys: Arc<ProgramKeys>) -> Self {
        Self {
            program: ValueProgram::new(keys),
        }
    }

    /// Load persisted keys, or run setup (and persist, if a path is set)
    ///
    /// # Performance
    ///
    /// Setup for both circuits is sub-second in release builds; loading is
    /// dominated by point decompression.
    pub fn from_config(config: &Config) -> LedgerResult<Self> {
        if let Some(path) = &config.circuit_keys_path {
            if path.exists() {
                let keys = ProgramKeys::read_from(path)?;
                return Ok(Self::new(Arc::new(keys)));
            }
        }

        let keys = match config.setup_seed {
            Some(seed) => {
                tracing::warn!(seed, "Running deterministic circuit setup");
                ProgramKeys::setup(&mut StdRng::seed_from_u64(seed))?
            }
            None => ProgramKeys::setup(&mut rand::thread_rng())?,
        };

        if let Some(path) = &config.circuit_keys_path {
            keys.write_to(path)?;
        }
        Ok(Self::new(Arc::new(keys)))
    }

    pub fn keys(&self) -> &Arc<ProgramKeys> {
        self.program.keys()
    }

    pub fn verification_keys(&self) -> &VerificationKeys {
        self.program.verification_keys()
    }

    pub async fn create(&self, add_value: AddValue) -> LedgerResult<Proof> {
        let program = self.program.clone();
        let proof = tokio::task::spawn_blocking(move || {
            program.create(add_value, &mut rand::thread_rng())
        })
        .await??;
        Ok(proof)
    }

    pub async fn merge(&self, left: Proof, right: Proof) -> LedgerResult<Proof> {
        let program = self.program.clone();
        let proof = tokio::task::spawn_blocking(move || {
            program.merge(&left, &right, &mut rand::thread_rng())
        })
        .await??;
        Ok(proof)
    }

    /// Prove every value concurrently; output order follows input order
    pub async fn create_many(&self, values: Vec<AddValue>) -> LedgerResult<Vec<Proof>> {
        let handles: Vec<_> = values
            .into_iter()
            .map(|add_value| {
                let service = self.clone();
                tokio::spawn(async move { service.create(add_value).await })
            })
            .collect();

        let mut proofs = Vec::with_capacity(handles.len());
        for handle in handles {
            proofs.push(handle.await??);
        }
        Ok(proofs)
    }

    /// Reduce proofs pairwise, level by level, into one root
    pub async fn aggregate(&self, proofs: Vec<Proof>) -> LedgerResult<Proof> {
        if proofs.is_empty() {
            return Err(LedgerError::InvalidInput(
                "cannot aggregate an empty set of proofs".to_string(),
            ));
        }

        let leaves = proofs.len();
        let mut level = proofs;
        while level.len() > 1 {
            let mut carry = None;
            let mut handles = Vec::with_capacity(level.len() / 2);

            let mut iter = level.into_iter();
            while let Some(left) = iter.next() {
                match iter.next() {
                    Some(right) => {
                        let service = self.clone();
                        handles.push(tokio::spawn(async move { service.merge(left, right).await }));
                    }
                    None => carry = Some(left),
                }
            }

            let mut next = Vec::with_capacity(handles.len() + 1);
            for handle in handles {
                next.push(handle.await??);
            }
            next.extend(carry);
            level = next;
        }

        let root = level.remove(0);
        tracing::info!(
            leaves,
            depth = root.depth(),
            value = root.public_output().value,
            "Proofs aggregated"
        );
        Ok(root)
    }

    pub fn verify(&self, proof: &Proof) -> LedgerResult<AddValue> {
        Ok(self.program.verify(proof)?)
    }
}
