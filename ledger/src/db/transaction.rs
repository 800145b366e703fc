//! Staged contract transactions
//!
//! A contract call never touches the store directly. It stages what it
//! expects (preconditions), what it changes (updates) and what it emits
//! (events) into a `Transaction`, and the store applies all of it or none.

use crate::error::LedgerError;
use crate::types::{AccountId, AddValueEvent, StateSlots, TokenId};

/// Must hold against live state at commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Persisted contract field still has the witnessed value
    FieldEquals {
        contract: AccountId,
        index: usize,
        value: u64,
    },
    /// Sub-ledger balance is exactly `balance`
    BalanceEquals {
        account: AccountId,
        token: TokenId,
        balance: u64,
    },
}

impl Precondition {
    /// Error reported when this precondition fails against `actual`
    pub(crate) fn violation(&self, actual: Option<u64>) -> LedgerError {
        match self {
            Precondition::FieldEquals {
                contract,
                index,
                value,
            } => LedgerError::StaleState(format!(
                "field {} of {} is {:?}, call was built against {}",
                index, contract, actual, value
            )),
            Precondition::BalanceEquals {
                account, balance, ..
            } => LedgerError::DoubleInitialization(format!(
                "{} already holds balance {} (expected {})",
                account,
                actual.unwrap_or_default(),
                balance
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Increase a sub-ledger balance
    Mint {
        account: AccountId,
        token: TokenId,
        amount: u64,
    },
    /// Overwrite all eight state slots
    SetSlots {
        account: AccountId,
        token: TokenId,
        slots: StateSlots,
    },
}

/// Everything one contract call commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub contract: AccountId,
    pub preconditions: Vec<Precondition>,
    pub updates: Vec<Update>,
    pub events: Vec<AddValueEvent>,
}

impl Transaction {
    pub fn new(contract: AccountId) -> Self {
        Self {
            contract,
            preconditions: Vec::new(),
            updates: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn update(mut self, update: Update) -> Self {
        self.updates.push(update);
        self
    }

    pub fn emit(mut self, event: AddValueEvent) -> Self {
        self.events.push(event);
        self
    }
}
