//! Groth16 key generation for the create and merge circuits
//!
//! Setup runs once per process (or once per deployment, when keys are
//! persisted). The resulting `ProgramKeys` value is immutable and shared by
//! reference into every prove call; `VerificationKeys` is the smaller half
//! a verifier needs.

use std::fmt;
use std::fs;
use std::path::Path;

use ark_bn254::Bn254;
use ark_ec::pairing::Pairing;
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof as Groth16Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};

use crate::create::CreateCircuit;
use crate::error::{CircuitError, CircuitResult};
use crate::merge::MergeCircuit;

/// Pairing curve used for every proof
pub type Curve = Bn254;

/// Scalar field of `Curve`; circuits are instantiated over it
pub type Scalar = <Curve as Pairing>::ScalarField;

/// Header of the persisted key file
const KEYS_MAGIC: &[u8; 8] = b"CAPVAL01";

/// Domain tag mixed into the verification key fingerprint
const FINGERPRINT_DOMAIN: &[u8] = b"capped-value/verification-keys/v1";

/// Proving keys for both circuits plus their verification half
#[derive(Clone)]
pub struct ProgramKeys {
    create_pk: ProvingKey<Curve>,
    merge_pk: ProvingKey<Curve>,
    verification: VerificationKeys,
}

/// Prepared verifying keys for both circuits
#[derive(Clone)]
pub struct VerificationKeys {
    create: PreparedVerifyingKey<Curve>,
    merge: PreparedVerifyingKey<Curve>,
    fingerprint: [u8; 32],
}

/// Which circuit a SNARK belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitKind {
    Create,
    Merge,
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitKind::Create => write!(f, "create"),
            CircuitKind::Merge => write!(f, "merge"),
        }
    }
}

impl ProgramKeys {
    /// Run circuit-specific setup for both circuits
    ///
    /// # Performance
    ///
    /// Both circuits are small (a few hundred constraints), so setup takes
    /// well under a second in release builds.
    pub fn setup<R: RngCore + CryptoRng>(rng: &mut R) -> CircuitResult<Self> {
        tracing::info!("Generating create/merge circuit keys...");

        let (create_pk, _) =
            Groth16::<Curve>::circuit_specific_setup(CreateCircuit::<Scalar>::empty(), rng)?;
        let (merge_pk, _) =
            Groth16::<Curve>::circuit_specific_setup(MergeCircuit::<Scalar>::empty(), rng)?;

        let keys = Self::from_proving_keys(create_pk, merge_pk)?;

        tracing::info!(
            fingerprint = %keys.verification.fingerprint_hex(),
            "Circuit keys generated successfully"
        );
        Ok(keys)
    }

    fn from_proving_keys(
        create_pk: ProvingKey<Curve>,
        merge_pk: ProvingKey<Curve>,
    ) -> CircuitResult<Self> {
        let verification = VerificationKeys::new(&create_pk.vk, &merge_pk.vk)?;
        Ok(Self {
            create_pk,
            merge_pk,
            verification,
        })
    }

    pub fn verification_keys(&self) -> &VerificationKeys {
        &self.verification
    }

    pub(crate) fn create_pk(&self) -> &ProvingKey<Curve> {
        &self.create_pk
    }

    pub(crate) fn merge_pk(&self) -> &ProvingKey<Curve> {
        &self.merge_pk
    }

    /// Serialize both proving keys (compressed) behind a magic header
    pub fn to_bytes(&self) -> CircuitResult<Vec<u8>> {
        let mut bytes = KEYS_MAGIC.to_vec();
        self.create_pk.serialize_compressed(&mut bytes)?;
        self.merge_pk.serialize_compressed(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> CircuitResult<Self> {
        let mut reader = bytes
            .strip_prefix(KEYS_MAGIC.as_slice())
            .ok_or_else(|| CircuitError::Serialization("missing key file header".to_string()))?;

        let create_pk = ProvingKey::<Curve>::deserialize_compressed(&mut reader)?;
        let merge_pk = ProvingKey::<Curve>::deserialize_compressed(&mut reader)?;

        if !reader.is_empty() {
            return Err(CircuitError::Serialization(format!(
                "{} trailing bytes after proving keys",
                reader.len()
            )));
        }

        Self::from_proving_keys(create_pk, merge_pk)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> CircuitResult<()> {
        fs::write(path.as_ref(), self.to_bytes()?)?;
        tracing::info!(path = %path.as_ref().display(), "Circuit keys written");
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> CircuitResult<Self> {
        let bytes = fs::read(path.as_ref())?;
        let keys = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.as_ref().display(),
            fingerprint = %keys.verification.fingerprint_hex(),
            "Circuit keys loaded"
        );
        Ok(keys)
    }
}

impl fmt::Debug for ProgramKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramKeys")
            .field("verification", &self.verification)
            .finish_non_exhaustive()
    }
}

impl VerificationKeys {
    fn new(create: &VerifyingKey<Curve>, merge: &VerifyingKey<Curve>) -> CircuitResult<Self> {
        let mut hasher = Keccak256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        for vk in [create, merge] {
            let mut bytes = Vec::new();
            vk.serialize_compressed(&mut bytes)?;
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }

        Ok(Self {
            create: Groth16::<Curve>::process_vk(create)?,
            merge: Groth16::<Curve>::process_vk(merge)?,
            fingerprint: hasher.finalize().into(),
        })
    }

    /// Keccak-256 over both verifying keys; identifies a compiled program
    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        format!("0x{}", hex::encode(self.fingerprint))
    }

    /// Check one serialized Groth16 proof against its public inputs
    pub(crate) fn verify_snark(
        &self,
        kind: CircuitKind,
        public_inputs: &[Scalar],
        snark: &[u8],
    ) -> CircuitResult<()> {
        let proof = Groth16Proof::<Curve>::deserialize_compressed(snark).map_err(|e| {
            CircuitError::verification(format!("malformed {} proof: {}", kind, e))
        })?;

        let pvk = match kind {
            CircuitKind::Create => &self.create,
            CircuitKind::Merge => &self.merge,
        };

        let valid = Groth16::<Curve>::verify_with_processed_vk(pvk, public_inputs, &proof)
            .map_err(|e| CircuitError::verification(format!("{} proof: {}", kind, e)))?;

        if !valid {
            return Err(CircuitError::verification(format!(
                "{} proof does not match its public output",
                kind
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for VerificationKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKeys")
            .field("fingerprint", &self.fingerprint_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fingerprint_stable_across_serialization() {
        let mut rng = StdRng::seed_from_u64(7);
        let keys = ProgramKeys::setup(&mut rng).unwrap();

        let restored = ProgramKeys::from_bytes(&keys.to_bytes().unwrap()).unwrap();
        assert_eq!(
            keys.verification_keys().fingerprint(),
            restored.verification_keys().fingerprint()
        );
    }

    #[test]
    fn test_independent_setups_differ() {
        let a = ProgramKeys::setup(&mut StdRng::seed_from_u64(1)).unwrap();
        let b = ProgramKeys::setup(&mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(
            a.verification_keys().fingerprint(),
            b.verification_keys().fingerprint()
        );
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(
            ProgramKeys::from_bytes(b"not a key file"),
            Err(CircuitError::Serialization(_))
        ));
    }

    #[test]
    fn test_malformed_snark_rejected() {
        let keys = ProgramKeys::setup(&mut StdRng::seed_from_u64(3)).unwrap();
        let err = keys
            .verification_keys()
            .verify_snark(CircuitKind::Create, &[], &[0u8; 7])
            .unwrap_err();
        assert!(matches!(err, CircuitError::ProofVerificationFailure { .. }));
    }
}
