//! Capped Value Ledger Library
//!
//! # Overview
//!
//! Accounts accrue a balance that can only be created, never moved. Each
//! balance is minted once, from either a single capped value (`add_one`) or
//! an aggregate proof over many capped values (`add_many`).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Ledger                             │
//! │                                                           │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐  │
//! │  │ Services │  │ Contract │  │    DB    │  │   Auth   │  │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘  │
//! │       │             │             │             │        │
//! │       └─────────────┴─────────────┴─────────────┘        │
//! │                           │                               │
//! └───────────────────────────┼───────────────────────────────┘
//!                             │
//!                             ▼
//!                  ┌─────────────────────┐
//!                  │ capped-value-circuits│
//!                  └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `error`: `LedgerError` taxonomy
//! - `auth`: account keys and call authorization
//! - `contract`: the add contract and its persisted fields
//! - `db`: sub-ledger store and staged transactions
//! - `services`: prover, event hub, attestation
//! - `types`: addresses, token ids, slots, events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use capped_value_ledger::{AppState, Config};
//!
//! let state = AppState::bootstrap(Config::from_env()?)?;
//! let contract = state.deploy_contract(&contract_key)?;
//!
//! let proofs = state.prover.create_many(values).await?;
//! let proof = state.prover.aggregate(proofs).await?;
//!
//! let limit = contract.limit()?;
//! contract.add_many(&address, &proof, &limit, &authorization)?;
//! ```

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod contract;
pub mod db;
pub mod error;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use auth::{AccountKey, Authorization, CallDigest, Method};
pub use config::Config;
pub use contract::{AddContract, DeploymentReport, StateField, Witnessed};
pub use db::{InMemoryLedger, LedgerStore};
pub use error::{LedgerError, LedgerResult};
pub use services::{EventHub, LocalAttestation, ProverService};
pub use types::{AccountId, AddValueEvent, StateSlots, TokenId};

/// Shared process state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InMemoryLedger>,
    pub events: Arc<EventHub>,
    pub prover: Arc<ProverService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build keys, store and event hub from configuration
    pub fn bootstrap(config: Config) -> LedgerResult<Self> {
        let prover = ProverService::from_config(&config)?;
        let events = Arc::new(EventHub::new());

        Ok(Self {
            store: Arc::new(InMemoryLedger::with_event_hub(events.clone())),
            events,
            prover: Arc::new(prover),
            config: Arc::new(config),
        })
    }

    /// Deploy the add contract with the configured limit and network
    pub fn deploy_contract(&self, contract_key: &AccountKey) -> LedgerResult<AddContract> {
        AddContract::deploy(
            self.store.clone(),
            contract_key,
            self.config.limit,
            self.prover.verification_keys().clone(),
            &self.config.network,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LedgerMessage;
    use capped_value_circuits::AddValue;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_bootstrap_and_stream() {
        let config = Config {
            setup_seed: Some(5),
            ..Config::default()
        };
        let state = AppState::bootstrap(config).unwrap();
        let mut rx = state.events.subscribe();

        let mut rng = StdRng::seed_from_u64(6);
        let contract = state.deploy_contract(&AccountKey::generate(&mut rng)).unwrap();
        let user = AccountKey::generate(&mut rng);

        let add_value = AddValue::new(42, 1000);
        let digest = CallDigest::new(contract.address(), Method::AddOne, &user.address(), &add_value);
        let auth = user.sign(&digest).unwrap();
        let limit = contract.limit().unwrap();
        contract.add_one(&user.address(), add_value, &limit, &auth).unwrap();

        assert!(matches!(rx.recv().await, Ok(LedgerMessage::ContractDeployed(_))));
        match rx.recv().await {
            Ok(LedgerMessage::ValueAdded(record)) => {
                assert_eq!(record.event.add_value, add_value);
                assert_eq!(record.event.address, user.address());
            }
            other => panic!("Expected ValueAdded message, got {:?}", other),
        }
    }
}
