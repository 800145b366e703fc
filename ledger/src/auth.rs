//! Account authorization
//!
//! Every state-changing call carries a BIP-340 Schnorr signature by the
//! target address over a Keccak-256 digest of the call. The address *is*
//! the x-only public key, so no key registry is needed.

use std::fmt;

use capped_value_circuits::AddValue;
use k256::schnorr::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};

use crate::error::{LedgerError, LedgerResult};
use crate::types::AccountId;

const CALL_DOMAIN: &[u8] = b"capped-value/call/v1";

/// Contract entry points that require authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    AddOne,
    AddMany,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::AddOne => "addOne",
            Method::AddMany => "addMany",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keccak-256 over everything a call commits to
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CallDigest([u8; 32]);

impl CallDigest {
    pub fn new(
        contract: &AccountId,
        method: Method,
        address: &AccountId,
        add_value: &AddValue,
    ) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(CALL_DOMAIN);
        hasher.update(contract.as_bytes());
        hasher.update([method.as_str().len() as u8]);
        hasher.update(method.as_str().as_bytes());
        hasher.update(address.as_bytes());
        hasher.update(add_value.value.to_le_bytes());
        hasher.update(add_value.limit.to_le_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CallDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallDigest(0x{})", hex::encode(self.0))
    }
}

/// Secret key controlling one address
#[derive(Clone)]
pub struct AccountKey {
    signing: SigningKey,
}

impl AccountKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing: SigningKey::random(rng),
        }
    }

    pub fn from_hex(secret: &str) -> LedgerResult<Self> {
        let stripped = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(stripped)
            .map_err(|e| LedgerError::InvalidInput(format!("account key: {}", e)))?;
        let signing = SigningKey::from_bytes(&bytes)
            .map_err(|e| LedgerError::InvalidInput(format!("account key: {}", e)))?;
        Ok(Self { signing })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn address(&self) -> AccountId {
        AccountId::from_bytes(self.signing.verifying_key().to_bytes().into())
    }

    pub fn sign(&self, digest: &CallDigest) -> LedgerResult<Authorization> {
        let signature: Signature = self
            .signing
            .sign_prehash(digest.as_bytes())
            .map_err(|e| LedgerError::Unauthorized(format!("signing failed: {}", e)))?;

        Ok(Authorization {
            signer: self.address(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Signature by `signer` over a `CallDigest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub signer: AccountId,
    pub signature: Vec<u8>,
}

impl Authorization {
    /// Succeeds only if `address` signed exactly `digest`
    pub fn verify(&self, address: &AccountId, digest: &CallDigest) -> LedgerResult<()> {
        if self.signer != *address {
            return Err(LedgerError::Unauthorized(format!(
                "{} cannot authorize calls for {}",
                self.signer, address
            )));
        }

        let key = VerifyingKey::from_bytes(address.as_bytes())
            .map_err(|_| LedgerError::Unauthorized(format!("{} is not a valid key", address)))?;
        let signature = Signature::try_from(self.signature.as_slice())
            .map_err(|_| LedgerError::Unauthorized("malformed signature".to_string()))?;

        key.verify_prehash(digest.as_bytes(), &signature)
            .map_err(|_| LedgerError::Unauthorized(format!("bad signature for {}", address)))
    }
}
