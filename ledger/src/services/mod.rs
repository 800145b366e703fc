//! Services Module
//!
//! # Services
//! - `ProverService`: create/merge proving on the blocking pool
//! - `EventHub`: broadcast of committed ledger messages
//! - `LocalAttestation`: in-process call delivery and receipts

pub mod attestation;
pub mod events;
mod prover;

pub use attestation::{AttestationService, CallPayload, ContractCall, LocalAttestation, TransactionReceipt};
pub use events::{EventHub, LedgerMessage};
pub use prover::ProverService;
