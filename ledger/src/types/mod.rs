//! Common Types Module
//!
//! Addresses, token ids, per-account state and the audit event.

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use capped_value_circuits::AddValue;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Number of generic state slots next to every sub-ledger balance
pub const STATE_SLOTS: usize = 8;

/// Domain tag for deriving a contract's token id
const TOKEN_ID_DOMAIN: &[u8] = b"capped-value/token-id/v1";

fn parse_hex32(s: &str) -> Result<[u8; 32], String> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| format!("invalid hex: {}", e))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

/// Account address: 32-byte x-only secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl TryFrom<String> for AccountId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

/// Sub-ledger namespace owned by one contract
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId([u8; 32]);

impl TokenId {
    /// Keccak-256 of the domain tag and the contract address
    pub fn derive(contract: &AccountId) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(TOKEN_ID_DOMAIN);
        hasher.update(contract.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self)
    }
}

impl TryFrom<String> for TokenId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        parse_hex32(&s).map(Self)
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> Self {
        id.to_string()
    }
}

/// Emitted exactly once per successful mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddValueEvent {
    pub add_value: AddValue,
    pub address: AccountId,
}

/// The eight generic slots of a sub-ledger account
///
/// Only slots 0 and 1 are ever written (`value`, `limit`); the rest stay
/// absent. Absent slots read as zero in the field view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSlots([Option<u64>; STATE_SLOTS]);

impl StateSlots {
    /// Slots 0-1 hold `[value, limit]`, slots 2-7 are cleared
    pub fn from_add_value(add_value: &AddValue) -> Self {
        let mut slots = [None; STATE_SLOTS];
        for (slot, raw) in slots.iter_mut().zip(add_value.to_state()) {
            *slot = Some(raw);
        }
        Self(slots)
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.0.get(index).copied().flatten()
    }

    pub fn raw(&self) -> &[Option<u64>; STATE_SLOTS] {
        &self.0
    }

    /// Field view with absent slots as zero
    pub fn to_fields(&self) -> [u64; STATE_SLOTS] {
        self.0.map(|slot| slot.unwrap_or(0))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// One `(address, token id)` record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: u64,
    pub slots: StateSlots,
}
