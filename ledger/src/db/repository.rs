//! Repository Pattern Implementation
//!
//! Contract code talks to the sub-ledger through `LedgerStore`; the
//! in-memory implementation below is what the binary and the tests run on.
//!
//! # Commit protocol
//!
//! ```text
//! write lock
//!   ├─ contract deployed?                 else UnknownContract
//!   ├─ every precondition vs live state   else StaleState / DoubleInitialization
//!   ├─ updates applied to scratch copies  else ConstraintViolation (overflow)
//!   ├─ scratch copies written back, events appended with sequence numbers
//!   └─ events published to the hub (still under the lock, so in order)
//! unlock
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::models::{ContractRecord, EventRecord};
use super::transaction::{Precondition, Transaction, Update};
use crate::error::{LedgerError, LedgerResult};
use crate::services::events::{EventHub, LedgerMessage};
use crate::types::{AccountId, AccountState, TokenId};

/// Sub-ledger store interface
pub trait LedgerStore: Send + Sync {
    /// Register a contract; fails if the address is already taken
    fn deploy(&self, record: ContractRecord) -> LedgerResult<()>;

    fn contract(&self, address: &AccountId) -> LedgerResult<ContractRecord>;

    /// Missing accounts read as zero balance with empty slots
    fn account(&self, address: &AccountId, token: &TokenId) -> AccountState;

    /// Events emitted by one contract, in commit order
    fn events(&self, contract: &AccountId) -> Vec<EventRecord>;

    /// Apply a transaction atomically
    fn commit(&self, tx: Transaction) -> LedgerResult<Vec<EventRecord>>;
}

type SubLedgerKey = (AccountId, TokenId);

#[derive(Default)]
struct LedgerState {
    contracts: HashMap<AccountId, ContractRecord>,
    accounts: HashMap<SubLedgerKey, AccountState>,
    events: Vec<EventRecord>,
}

impl LedgerState {
    fn observe(&self, precondition: &Precondition) -> (Option<u64>, u64) {
        match precondition {
            Precondition::FieldEquals {
                contract,
                index,
                value,
            } => (
                self.contracts.get(contract).and_then(|c| c.field(*index)),
                *value,
            ),
            Precondition::BalanceEquals {
                account,
                token,
                balance,
            } => (
                Some(
                    self.accounts
                        .get(&(*account, *token))
                        .map(|a| a.balance)
                        .unwrap_or(0),
                ),
                *balance,
            ),
        }
    }
}

/// `RwLock`-backed store
///
/// Every mutation completes before the guard drops, so a poisoned lock
/// still guards consistent state and is recovered rather than propagated.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    hub: Option<Arc<EventHub>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every committed event to `hub`
    pub fn with_event_hub(hub: Arc<EventHub>) -> Self {
        Self {
            state: RwLock::default(),
            hub: Some(hub),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for InMemoryLedger {
    fn deploy(&self, record: ContractRecord) -> LedgerResult<()> {
        let mut state = self.write();
        if state.contracts.contains_key(&record.address) {
            return Err(LedgerError::DoubleInitialization(format!(
                "contract already deployed at {}",
                record.address
            )));
        }

        tracing::info!(
            contract = %record.address,
            token = %record.token_id,
            network = %record.network,
            "Contract deployed"
        );
        if let Some(hub) = &self.hub {
            hub.publish(LedgerMessage::ContractDeployed(record.clone()));
        }
        state.contracts.insert(record.address, record);
        Ok(())
    }

    fn contract(&self, address: &AccountId) -> LedgerResult<ContractRecord> {
        self.read()
            .contracts
            .get(address)
            .cloned()
            .ok_or(LedgerError::UnknownContract(*address))
    }

    fn account(&self, address: &AccountId, token: &TokenId) -> AccountState {
        self.read()
            .accounts
            .get(&(*address, *token))
            .copied()
            .unwrap_or_default()
    }

    fn events(&self, contract: &AccountId) -> Vec<EventRecord> {
        self.read()
            .events
            .iter()
            .filter(|record| record.contract == *contract)
            .copied()
            .collect()
    }

    fn commit(&self, tx: Transaction) -> LedgerResult<Vec<EventRecord>> {
        let mut state = self.write();

        if !state.contracts.contains_key(&tx.contract) {
            return Err(LedgerError::UnknownContract(tx.contract));
        }

        for precondition in &tx.preconditions {
            let (actual, expected) = state.observe(precondition);
            if actual != Some(expected) {
                tracing::warn!(contract = %tx.contract, ?precondition, ?actual, "Commit rejected");
                return Err(precondition.violation(actual));
            }
        }

        let mut staged: HashMap<SubLedgerKey, AccountState> = HashMap::new();
        for update in &tx.updates {
            match update {
                Update::Mint {
                    account,
                    token,
                    amount,
                } => {
                    let entry = stage(&mut staged, &state.accounts, (*account, *token));
                    entry.balance = entry.balance.checked_add(*amount).ok_or_else(|| {
                        LedgerError::ConstraintViolation(format!(
                            "balance overflow minting {}",
                            amount
                        ))
                    })?;
                }
                Update::SetSlots {
                    account,
                    token,
                    slots,
                } => {
                    stage(&mut staged, &state.accounts, (*account, *token)).slots = *slots;
                }
            }
        }

        state.accounts.extend(staged);

        let mut records = Vec::with_capacity(tx.events.len());
        for event in tx.events {
            let record = EventRecord {
                sequence: state.events.len() as u64,
                contract: tx.contract,
                event,
            };
            state.events.push(record);
            records.push(record);
        }

        if let Some(hub) = &self.hub {
            for record in &records {
                hub.publish(LedgerMessage::ValueAdded(*record));
            }
        }

        tracing::debug!(
            contract = %tx.contract,
            updates = tx.updates.len(),
            events = records.len(),
            "Transaction committed"
        );
        Ok(records)
    }
}

/// Scratch copy of an account, seeded from live state on first touch
fn stage<'a>(
    staged: &'a mut HashMap<SubLedgerKey, AccountState>,
    live: &HashMap<SubLedgerKey, AccountState>,
    key: SubLedgerKey,
) -> &'a mut AccountState {
    staged
        .entry(key)
        .or_insert_with(|| live.get(&key).copied().unwrap_or_default())
}
