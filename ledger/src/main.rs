//! Capped Value Ledger CLI
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐   ┌─────────────┐
//! │ AddValue(s)  │──▶│ ProverService │──▶│ LocalAttestation │──▶│ AddContract │
//! │ from args    │   │ create/merge  │   │ submit(call)     │   │ add_one/many│
//! └──────────────┘   └───────────────┘   └──────────────────┘   └─────────────┘
//! ```
//!
//! Each run deploys a fresh contract into an in-memory ledger, so a run
//! demonstrates one mint end to end and prints the receipt and the
//! resulting account state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capped_value_circuits::AddValue;
use capped_value_ledger::{
    services::{AttestationService, CallPayload, ContractCall},
    AccountKey, AddContract, AppState, CallDigest, Config, LocalAttestation, ProverService,
};

#[derive(Parser)]
#[command(name = "capped-ledger", version, about = "Capped value-accumulation ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mint a single value into a fresh account
    AddOne {
        #[arg(long)]
        value: u64,

        /// Hex secret of the receiving account; random when omitted
        #[arg(long, env = "ACCOUNT_KEY")]
        account_key: Option<String>,
    },
    /// Prove each value, aggregate the proofs and mint the sum
    AddMany {
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<u64>,

        #[arg(long, env = "ACCOUNT_KEY")]
        account_key: Option<String>,

        /// Write the aggregate proof here
        #[arg(long)]
        proof_out: Option<PathBuf>,
    },
    /// Generate (or load) circuit keys and print their fingerprint
    Keys {
        /// Overrides CIRCUIT_KEYS_PATH
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Override with RUST_LOG, e.g. RUST_LOG=capped_value_ledger=info
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capped_value_ledger=debug,capped_value_circuits=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing::info!(limit = config.limit, network = %config.network, "📋 Configuration loaded");

    match cli.command {
        Command::Keys { out } => keys(config, out),
        Command::AddOne { value, account_key } => {
            let session = Session::start(config, account_key)?;
            let add_value = AddValue::new(value, session.state.config.limit);
            session.submit(CallPayload::AddOne { add_value }).await
        }
        Command::AddMany {
            values,
            account_key,
            proof_out,
        } => {
            let session = Session::start(config, account_key)?;
            let limit = session.state.config.limit;
            let prover = &session.state.prover;

            let leaves = values.iter().map(|v| AddValue::new(*v, limit)).collect();
            let proofs = prover.create_many(leaves).await?;
            let proof = prover.aggregate(proofs).await?;
            tracing::info!(
                leaves = proof.leaf_count(),
                value = proof.public_output().value,
                "🔐 Aggregate proof ready"
            );

            if let Some(path) = proof_out {
                std::fs::write(&path, proof.to_bytes()?)
                    .with_context(|| format!("writing proof to {}", path.display()))?;
                tracing::info!(path = %path.display(), "💾 Proof written");
            }
            session.submit(CallPayload::AddMany { proof }).await
        }
    }
}

/// One deployed contract plus the account minting into it
struct Session {
    state: AppState,
    contract: Arc<AddContract>,
    attestation: LocalAttestation,
    account: AccountKey,
}

impl Session {
    fn start(config: Config, account_key: Option<String>) -> Result<Self> {
        let contract_key = load_or_generate(config.contract_key.as_deref())
            .context("CONTRACT_KEY is not a valid secret key")?;
        let account = load_or_generate(account_key.as_deref())
            .context("account key is not a valid secret key")?;

        let state = AppState::bootstrap(config).context("bootstrap failed")?;
        tracing::info!(
            fingerprint = %state.prover.verification_keys().fingerprint_hex(),
            "🔐 Circuit keys ready"
        );

        let contract = Arc::new(state.deploy_contract(&contract_key)?);
        contract
            .verify_deployment(state.prover.verification_keys())?
            .ensure_matches()?;
        tracing::info!(contract = %contract.address(), "🚀 Contract deployed");

        let mut attestation = LocalAttestation::new();
        attestation.register(contract.clone());

        Ok(Self {
            state,
            contract,
            attestation,
            account,
        })
    }

    async fn submit(&self, payload: CallPayload) -> Result<()> {
        let contract = *self.contract.address();
        let address = self.account.address();
        let digest = CallDigest::new(&contract, payload.method(), &address, &payload.add_value());

        let call = ContractCall {
            contract,
            address,
            limit: self.contract.limit()?,
            authorization: self.account.sign(&digest)?,
            payload,
        };

        let receipt = self.attestation.submit(call).await;
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        println!("address: {}", address);
        println!("balance: {}", self.contract.balance_of(&address));
        println!("slots:   {:?}", self.contract.state_of(&address).to_fields());

        if !receipt.is_included() {
            anyhow::bail!("transaction {} was rejected", receipt.tx_hash());
        }
        Ok(())
    }
}

fn load_or_generate(secret: Option<&str>) -> Result<AccountKey> {
    Ok(match secret {
        Some(hex) => AccountKey::from_hex(hex)?,
        None => AccountKey::generate(&mut rand::thread_rng()),
    })
}

fn keys(mut config: Config, out: Option<PathBuf>) -> Result<()> {
    if out.is_some() {
        config.circuit_keys_path = out;
    }
    let prover = ProverService::from_config(&config).context("circuit key setup failed")?;
    println!("{}", prover.verification_keys().fingerprint_hex());
    Ok(())
}
