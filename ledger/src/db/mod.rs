//! Sub-ledger Store
//!
//! Balances and state slots keyed by `(address, token id)`, deployed
//! contracts, and the append-only event log.
//!
//! Contracts stage `Transaction`s; `LedgerStore::commit` applies each one
//! atomically under a single write lock. Two calls racing on the same
//! precondition serialize there, and at most one of them commits.

mod models;
mod repository;
mod transaction;

pub use models::*;
pub use repository::{InMemoryLedger, LedgerStore};
pub use transaction::{Precondition, Transaction, Update};
