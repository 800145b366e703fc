//! Configuration Module
//!
//! Everything is read from the environment (after `.env`, if present).
//! Nothing is required; every value has a development default.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Cap written into the contract at deploy (default: 1000)
    pub limit: u64,

    /// Network label recorded with the deployment (default: devnet)
    pub network: String,

    /// Hex secret of the contract account; random when absent
    pub contract_key: Option<String>,

    /// Circuit key file; loaded if it exists, written after setup otherwise
    pub circuit_keys_path: Option<PathBuf>,

    /// Seed for a reproducible Groth16 setup (development only)
    pub setup_seed: Option<u64>,

    /// Deployment environment (development, staging, production)
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Environment Variables
    ///
    /// - `LEDGER_LIMIT`: contract limit (default: 1000)
    /// - `LEDGER_NETWORK`: network label (default: devnet)
    /// - `CONTRACT_KEY`: contract account secret, hex
    /// - `CIRCUIT_KEYS_PATH`: persisted circuit keys
    /// - `SETUP_SEED`: deterministic setup seed, rejected in production
    /// - `ENVIRONMENT`: development | staging | production
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment = match var("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        };

        let setup_seed = var("SETUP_SEED")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("SETUP_SEED must be a valid number")?;

        if setup_seed.is_some() && environment == Environment::Production {
            anyhow::bail!("SETUP_SEED makes circuit keys predictable and is not allowed in production");
        }

        Ok(Config {
            limit: var("LEDGER_LIMIT")
                .unwrap_or_else(|| "1000".to_string())
                .parse()
                .context("LEDGER_LIMIT must be a valid number")?,

            network: var("LEDGER_NETWORK").unwrap_or_else(|| "devnet".to_string()),

            contract_key: var("CONTRACT_KEY"),

            circuit_keys_path: var("CIRCUIT_KEYS_PATH").map(PathBuf::from),

            setup_seed,

            environment,
        })
    }

    /// Whether production-only guards apply
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limit: 1000,
            network: "devnet".to_string(),
            contract_key: None,
            circuit_keys_path: None,
            setup_seed: None,
            environment: Environment::Development,
        }
    }
}
