//! Add Contract
//!
//! Stateful verifier in front of one sub-ledger. It holds a single
//! persisted field, `limit`, and mints balance only through two entry
//! points:
//!
//! - `add_one`: a single in-band `AddValue`, checked inline
//! - `add_many`: an aggregate proof tree, checked cryptographically
//!
//! Both end in `create_add_value`, which stages one transaction:
//!
//! ```text
//! require  limit unchanged since the caller read it     (StaleState)
//! require  balance(address) == 0                        (DoubleInitialization)
//! mint     value to (address, token id)
//! set      slots = [value, limit, -, -, -, -, -, -]
//! emit     AddValueEvent { add_value, address }
//! ```
//!
//! Minted balance can never move: the token base approval always fails.

pub mod state;

use std::sync::Arc;

use capped_value_circuits::{validation, AddValue, Proof, VerificationKeys};
use serde::Serialize;

use crate::auth::{AccountKey, Authorization, CallDigest, Method};
use crate::db::{ContractRecord, EventRecord, LedgerStore, Precondition, Transaction, Update};
use crate::error::{LedgerError, LedgerResult};
use crate::types::{AccountId, AddValueEvent, StateSlots, TokenId};

pub use state::{FieldType, StateField, Witnessed, SCHEMA};

/// One balance change requested through the token base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub address: AccountId,
    pub token_id: TokenId,
    pub balance_change: i128,
}

/// Batch of account updates submitted for approval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdateForest(pub Vec<AccountUpdate>);

/// Deployed keys vs. locally compiled keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    pub contract: AccountId,
    pub network: String,
    pub deployed_fingerprint: String,
    pub local_fingerprint: String,
    pub matches: bool,
}

impl DeploymentReport {
    pub fn ensure_matches(&self) -> LedgerResult<()> {
        if !self.matches {
            return Err(LedgerError::ProofVerificationFailure(format!(
                "contract {} was deployed with keys {}, local keys are {}",
                self.contract, self.deployed_fingerprint, self.local_fingerprint
            )));
        }
        Ok(())
    }
}

/// Handle on a deployed add contract
pub struct AddContract {
    store: Arc<dyn LedgerStore>,
    address: AccountId,
    token_id: TokenId,
    keys: VerificationKeys,
}

impl AddContract {
    /// Register the contract and write `limit` once
    pub fn deploy(
        store: Arc<dyn LedgerStore>,
        contract_key: &AccountKey,
        limit: u64,
        keys: VerificationKeys,
        network: &str,
    ) -> LedgerResult<Self> {
        if limit < 2 {
            return Err(LedgerError::InvalidInput(format!(
                "limit {} admits no positive value",
                limit
            )));
        }

        let address = contract_key.address();
        let token_id = TokenId::derive(&address);

        let mut fields = vec![0; SCHEMA.len()];
        fields[state::LIMIT.index] = limit;

        store.deploy(ContractRecord {
            address,
            token_id,
            fields,
            vk_fingerprint: keys.fingerprint_hex(),
            network: network.to_string(),
        })?;

        Ok(Self {
            store,
            address,
            token_id,
            keys,
        })
    }

    /// Attach to an existing deployment
    pub fn at(
        store: Arc<dyn LedgerStore>,
        address: AccountId,
        keys: VerificationKeys,
    ) -> LedgerResult<Self> {
        let record = store.contract(&address)?;
        Ok(Self {
            store,
            address,
            token_id: record.token_id,
            keys,
        })
    }

    pub fn address(&self) -> &AccountId {
        &self.address
    }

    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    pub fn schema() -> &'static [StateField] {
        SCHEMA
    }

    /// Read `limit` together with its freshness witness
    pub fn limit(&self) -> LedgerResult<Witnessed<u64>> {
        let record = self.store.contract(&self.address)?;
        let value = record.field(state::LIMIT.index).ok_or_else(|| {
            LedgerError::StaleState(format!("{} has no limit field", self.address))
        })?;
        Ok(Witnessed::new(self.address, &state::LIMIT, value))
    }

    /// Mint a single in-band value
    pub fn add_one(
        &self,
        address: &AccountId,
        add_value: AddValue,
        limit: &Witnessed<u64>,
        authorization: &Authorization,
    ) -> LedgerResult<EventRecord> {
        limit.check_origin(&self.address, &state::LIMIT)?;
        validation::validate_add_value(add_value.value, limit.value())?;

        self.create_add_value(Method::AddOne, address, add_value, limit, authorization)
    }

    /// Mint the output of an aggregate proof
    pub fn add_many(
        &self,
        address: &AccountId,
        proof: &Proof,
        limit: &Witnessed<u64>,
        authorization: &Authorization,
    ) -> LedgerResult<EventRecord> {
        limit.check_origin(&self.address, &state::LIMIT)?;

        let claimed = proof.public_output();
        if claimed.limit != limit.value() {
            return Err(LedgerError::LimitMismatch {
                expected: limit.value(),
                actual: claimed.limit,
            });
        }

        let add_value = proof.verify(&self.keys).map_err(|e| {
            tracing::warn!(contract = %self.address, %address, "Rejected aggregate proof: {}", e);
            LedgerError::from(e)
        })?;

        self.create_add_value(Method::AddMany, address, add_value, limit, authorization)
    }

    fn create_add_value(
        &self,
        method: Method,
        address: &AccountId,
        add_value: AddValue,
        limit: &Witnessed<u64>,
        authorization: &Authorization,
    ) -> LedgerResult<EventRecord> {
        let digest = CallDigest::new(&self.address, method, address, &add_value);
        authorization.verify(address, &digest)?;

        let tx = Transaction::new(self.address)
            .require(Precondition::FieldEquals {
                contract: self.address,
                index: limit.field_index(),
                value: limit.value(),
            })
            .require(Precondition::BalanceEquals {
                account: *address,
                token: self.token_id,
                balance: 0,
            })
            .update(Update::Mint {
                account: *address,
                token: self.token_id,
                amount: add_value.value,
            })
            .update(Update::SetSlots {
                account: *address,
                token: self.token_id,
                slots: StateSlots::from_add_value(&add_value),
            })
            .emit(AddValueEvent {
                add_value,
                address: *address,
            });

        let record = self
            .store
            .commit(tx)?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Internal("commit returned no event record".to_string()))?;

        tracing::info!(
            contract = %self.address,
            %address,
            %method,
            value = add_value.value,
            limit = add_value.limit,
            sequence = record.sequence,
            "Value added"
        );
        Ok(record)
    }

    /// Token base approval; every transfer is refused
    pub fn approve_base(&self, forest: &AccountUpdateForest) -> LedgerResult<()> {
        tracing::warn!(
            contract = %self.address,
            updates = forest.0.len(),
            "Refusing account update approval"
        );
        Err(LedgerError::PolicyViolation(
            "transfers are not allowed".to_string(),
        ))
    }

    /// Move balance between accounts; routes through `approve_base`
    pub fn transfer(&self, from: &AccountId, to: &AccountId, amount: u64) -> LedgerResult<()> {
        let forest = AccountUpdateForest(vec![
            AccountUpdate {
                address: *from,
                token_id: self.token_id,
                balance_change: -i128::from(amount),
            },
            AccountUpdate {
                address: *to,
                token_id: self.token_id,
                balance_change: i128::from(amount),
            },
        ]);
        self.approve_base(&forest)
    }

    pub fn balance_of(&self, address: &AccountId) -> u64 {
        self.store.account(address, &self.token_id).balance
    }

    pub fn state_of(&self, address: &AccountId) -> StateSlots {
        self.store.account(address, &self.token_id).slots
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.store.events(&self.address)
    }

    /// Compare the deployed key fingerprint with `local`
    pub fn verify_deployment(&self, local: &VerificationKeys) -> LedgerResult<DeploymentReport> {
        let record = self.store.contract(&self.address)?;
        let local_fingerprint = local.fingerprint_hex();

        Ok(DeploymentReport {
            contract: self.address,
            matches: record.vk_fingerprint == local_fingerprint,
            network: record.network,
            deployed_fingerprint: record.vk_fingerprint,
            local_fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryLedger;
    use capped_value_circuits::{ProgramKeys, ValueProgram};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::OnceLock;

    const LIMIT: u64 = 1000;

    fn program() -> &'static ValueProgram {
        static PROGRAM: OnceLock<ValueProgram> = OnceLock::new();
        PROGRAM.get_or_init(|| {
            let keys = ProgramKeys::setup(&mut StdRng::seed_from_u64(42)).unwrap();
            ValueProgram::new(Arc::new(keys))
        })
    }

    struct Fixture {
        contract: AddContract,
        rng: StdRng,
    }

    impl Fixture {
        fn new(seed: u64) -> Self {
            let mut rng = StdRng::seed_from_u64(seed);
            let contract_key = AccountKey::generate(&mut rng);
            let contract = AddContract::deploy(
                Arc::new(InMemoryLedger::new()),
                &contract_key,
                LIMIT,
                program().verification_keys().clone(),
                "devnet",
            )
            .unwrap();
            Self { contract, rng }
        }

        fn user(&mut self) -> AccountKey {
            AccountKey::generate(&mut self.rng)
        }

        fn sign(&self, user: &AccountKey, method: Method, add_value: AddValue) -> Authorization {
            let digest = CallDigest::new(self.contract.address(), method, &user.address(), &add_value);
            user.sign(&digest).unwrap()
        }

        fn add_one(&self, user: &AccountKey, value: u64) -> LedgerResult<EventRecord> {
            let add_value = AddValue::new(value, LIMIT);
            let auth = self.sign(user, Method::AddOne, add_value);
            let limit = self.contract.limit()?;
            self.contract.add_one(&user.address(), add_value, &limit, &auth)
        }

        fn prove(&mut self, values: &[(u64, u64)]) -> Proof {
            let leaves = values
                .iter()
                .map(|(v, l)| program().create(AddValue::new(*v, *l), &mut self.rng).unwrap())
                .collect();
            program().aggregate(leaves, &mut self.rng).unwrap()
        }

        fn add_many(&self, user: &AccountKey, proof: &Proof) -> LedgerResult<EventRecord> {
            let auth = self.sign(user, Method::AddMany, proof.public_output());
            let limit = self.contract.limit()?;
            self.contract.add_many(&user.address(), proof, &limit, &auth)
        }
    }

    mod add_one_tests {
        use super::*;

        #[test]
        fn test_fresh_address() {
            let mut f = Fixture::new(1);
            let user = f.user();

            let record = f.add_one(&user, 300).unwrap();

            assert_eq!(f.contract.balance_of(&user.address()), 300);
            assert_eq!(
                f.contract.state_of(&user.address()).to_fields(),
                [300, LIMIT, 0, 0, 0, 0, 0, 0]
            );
            assert_eq!(f.contract.events(), vec![record]);
            assert_eq!(record.event.address, user.address());
        }

        #[test]
        fn test_second_mint_rejected() {
            let mut f = Fixture::new(2);
            let user = f.user();
            f.add_one(&user, 300).unwrap();

            let err = f.add_one(&user, 5).unwrap_err();

            assert!(matches!(err, LedgerError::DoubleInitialization(_)));
            assert_eq!(f.contract.balance_of(&user.address()), 300);
            assert_eq!(f.contract.state_of(&user.address()).get(0), Some(300));
            assert_eq!(f.contract.events().len(), 1);
        }

        #[test]
        fn test_value_bounds() {
            let mut f = Fixture::new(3);
            let user = f.user();

            assert!(matches!(
                f.add_one(&user, 0),
                Err(LedgerError::ConstraintViolation(_))
            ));
            assert!(matches!(
                f.add_one(&user, LIMIT),
                Err(LedgerError::ConstraintViolation(_))
            ));
            assert!(f.add_one(&user, LIMIT - 1).is_ok());
        }

        #[test]
        fn test_wrong_signer() {
            let mut f = Fixture::new(4);
            let owner = f.user();
            let intruder = f.user();

            let add_value = AddValue::new(300, LIMIT);
            let auth = f.sign(&intruder, Method::AddOne, add_value);
            let limit = f.contract.limit().unwrap();

            let err = f
                .contract
                .add_one(&owner.address(), add_value, &limit, &auth)
                .unwrap_err();
            assert!(matches!(err, LedgerError::Unauthorized(_)));
            assert_eq!(f.contract.balance_of(&owner.address()), 0);
            assert!(f.contract.events().is_empty());
        }

        #[test]
        fn test_signature_for_other_method_rejected() {
            let mut f = Fixture::new(5);
            let user = f.user();

            let add_value = AddValue::new(300, LIMIT);
            let auth = f.sign(&user, Method::AddMany, add_value);
            let limit = f.contract.limit().unwrap();

            assert!(matches!(
                f.contract.add_one(&user.address(), add_value, &limit, &auth),
                Err(LedgerError::Unauthorized(_))
            ));
        }

        #[test]
        fn test_witness_from_other_contract_is_stale() {
            let mut f = Fixture::new(6);
            let other = Fixture::new(7);
            let user = f.user();

            let add_value = AddValue::new(300, LIMIT);
            let auth = f.sign(&user, Method::AddOne, add_value);
            let foreign = other.contract.limit().unwrap();

            assert!(matches!(
                f.contract.add_one(&user.address(), add_value, &foreign, &auth),
                Err(LedgerError::StaleState(_))
            ));
        }

        #[test]
        fn test_concurrent_add_one_commits_once() {
            let mut f = Fixture::new(8);
            let user = f.user();

            let results: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = (1..=6u64)
                    .map(|v| {
                        let f = &f;
                        let user = &user;
                        s.spawn(move || f.add_one(user, v * 100))
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(committed.len(), 1);
            assert!(results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, LedgerError::DoubleInitialization(_))));
            assert_eq!(
                f.contract.balance_of(&user.address()),
                committed[0].event.add_value.value
            );
        }
    }

    mod add_many_tests {
        use super::*;

        #[test]
        fn test_merged_300_and_400() {
            let mut f = Fixture::new(10);
            let user = f.user();

            let proof = f.prove(&[(300, LIMIT), (400, LIMIT)]);
            assert_eq!(proof.public_output(), AddValue::new(700, LIMIT));

            let record = f.add_many(&user, &proof).unwrap();

            assert_eq!(f.contract.balance_of(&user.address()), 700);
            assert_eq!(
                f.contract.state_of(&user.address()).to_fields(),
                [700, LIMIT, 0, 0, 0, 0, 0, 0]
            );
            assert_eq!(
                f.contract.events(),
                vec![record]
            );
            assert_eq!(
                record.event,
                AddValueEvent {
                    add_value: AddValue::new(700, LIMIT),
                    address: user.address(),
                }
            );
        }

        #[test]
        fn test_other_limit_rejected() {
            let mut f = Fixture::new(11);
            let user = f.user();
            let proof = f.prove(&[(300, 2000), (400, 2000)]);

            assert_eq!(
                f.add_many(&user, &proof).unwrap_err(),
                LedgerError::LimitMismatch {
                    expected: LIMIT,
                    actual: 2000
                }
            );
            assert!(f.contract.events().is_empty());
        }

        #[test]
        fn test_tampered_proof_rejected() {
            let mut f = Fixture::new(12);
            let user = f.user();
            let proof = f.prove(&[(300, LIMIT), (400, LIMIT)]);

            let mut json = serde_json::to_value(&proof).unwrap();
            json["nodes"][2]["output"]["value"] = 900.into();
            let forged: Proof = serde_json::from_value(json).unwrap();

            assert!(matches!(
                f.add_many(&user, &forged),
                Err(LedgerError::ProofVerificationFailure(_))
            ));
            assert_eq!(f.contract.balance_of(&user.address()), 0);
        }

        #[test]
        fn test_aggregate_above_limit_is_minted() {
            let mut f = Fixture::new(13);
            let user = f.user();
            let proof = f.prove(&[(600, LIMIT), (700, LIMIT)]);

            f.add_many(&user, &proof).unwrap();
            assert_eq!(f.contract.balance_of(&user.address()), 1300);
        }

        #[test]
        fn test_add_many_after_add_one() {
            let mut f = Fixture::new(14);
            let user = f.user();
            f.add_one(&user, 1).unwrap();

            let proof = f.prove(&[(10, LIMIT)]);
            assert!(matches!(
                f.add_many(&user, &proof),
                Err(LedgerError::DoubleInitialization(_))
            ));
        }
    }

    mod policy_tests {
        use super::*;

        #[test]
        fn test_approve_base_always_fails() {
            let f = Fixture::new(20);
            assert!(matches!(
                f.contract.approve_base(&AccountUpdateForest::default()),
                Err(LedgerError::PolicyViolation(_))
            ));
        }

        #[test]
        fn test_transfer_refused() {
            let mut f = Fixture::new(21);
            let user = f.user();
            let other = f.user();
            f.add_one(&user, 300).unwrap();

            let err = f
                .contract
                .transfer(&user.address(), &other.address(), 100)
                .unwrap_err();
            assert_eq!(
                err,
                LedgerError::PolicyViolation("transfers are not allowed".to_string())
            );
            assert_eq!(f.contract.balance_of(&user.address()), 300);
            assert_eq!(f.contract.balance_of(&other.address()), 0);
        }
    }

    mod store_tests {
        use super::*;
        use crate::types::{AccountState, TokenId};

        /// Commits normally but hands back no event records
        struct SilentStore(InMemoryLedger);

        impl LedgerStore for SilentStore {
            fn deploy(&self, record: ContractRecord) -> LedgerResult<()> {
                self.0.deploy(record)
            }

            fn contract(&self, address: &AccountId) -> LedgerResult<ContractRecord> {
                self.0.contract(address)
            }

            fn account(&self, address: &AccountId, token: &TokenId) -> AccountState {
                self.0.account(address, token)
            }

            fn events(&self, contract: &AccountId) -> Vec<EventRecord> {
                self.0.events(contract)
            }

            fn commit(&self, tx: Transaction) -> LedgerResult<Vec<EventRecord>> {
                self.0.commit(tx)?;
                Ok(Vec::new())
            }
        }

        #[test]
        fn test_missing_event_record_is_internal_error() {
            let mut rng = StdRng::seed_from_u64(40);
            let contract = AddContract::deploy(
                Arc::new(SilentStore(InMemoryLedger::new())),
                &AccountKey::generate(&mut rng),
                LIMIT,
                program().verification_keys().clone(),
                "devnet",
            )
            .unwrap();
            let user = AccountKey::generate(&mut rng);

            let add_value = AddValue::new(300, LIMIT);
            let digest = CallDigest::new(contract.address(), Method::AddOne, &user.address(), &add_value);
            let auth = user.sign(&digest).unwrap();
            let limit = contract.limit().unwrap();

            let err = contract
                .add_one(&user.address(), add_value, &limit, &auth)
                .unwrap_err();
            assert!(matches!(err, LedgerError::Internal(_)));
            assert_eq!(err.code(), "INTERNAL");
        }
    }

    mod deployment_tests {
        use super::*;

        #[test]
        fn test_limit_witness() {
            let f = Fixture::new(30);
            let limit = f.contract.limit().unwrap();
            assert_eq!(limit.value(), LIMIT);
            assert_eq!(limit.contract(), f.contract.address());
            assert_eq!(limit.field_index(), 0);
        }

        #[test]
        fn test_double_deploy() {
            let mut rng = StdRng::seed_from_u64(31);
            let key = AccountKey::generate(&mut rng);
            let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
            let vks = program().verification_keys().clone();

            AddContract::deploy(store.clone(), &key, LIMIT, vks.clone(), "devnet").unwrap();
            assert!(matches!(
                AddContract::deploy(store, &key, 5, vks, "devnet"),
                Err(LedgerError::DoubleInitialization(_))
            ));
        }

        #[test]
        fn test_degenerate_limit() {
            let key = AccountKey::generate(&mut StdRng::seed_from_u64(32));
            let result = AddContract::deploy(
                Arc::new(InMemoryLedger::new()),
                &key,
                1,
                program().verification_keys().clone(),
                "devnet",
            );
            assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        }

        #[test]
        fn test_attach_to_deployment() {
            let mut rng = StdRng::seed_from_u64(33);
            let key = AccountKey::generate(&mut rng);
            let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
            let vks = program().verification_keys().clone();

            let deployed = AddContract::deploy(store.clone(), &key, LIMIT, vks.clone(), "devnet").unwrap();
            let attached = AddContract::at(store.clone(), key.address(), vks.clone()).unwrap();
            assert_eq!(attached.token_id(), deployed.token_id());

            let nowhere = AccountId::from_bytes([9; 32]);
            assert!(matches!(
                AddContract::at(store, nowhere, vks),
                Err(LedgerError::UnknownContract(_))
            ));
        }

        #[test]
        fn test_verify_deployment() {
            let f = Fixture::new(34);

            let report = f.contract.verify_deployment(program().verification_keys()).unwrap();
            assert!(report.matches);
            assert!(report.ensure_matches().is_ok());
            assert_eq!(report.network, "devnet");

            let foreign = ProgramKeys::setup(&mut StdRng::seed_from_u64(35)).unwrap();
            let report = f.contract.verify_deployment(foreign.verification_keys()).unwrap();
            assert!(!report.matches);
            assert!(report.ensure_matches().is_err());
        }
    }
}
