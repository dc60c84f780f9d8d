//! Application configuration
//!
//! Loaded from a JSON file; every field has a default, so a partial file (or
//! none at all) is valid. `FUNDTRAIL_BUDGET_CEILING` overrides the ceiling.

use fundtrail_core::Amount;
use fundtrail_ledger::{HashAlgorithm, LedgerConfig};
use fundtrail_requests::MachineConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `budget_ceiling`
pub const BUDGET_CEILING_ENV: &str = "FUNDTRAIL_BUDGET_CEILING";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ceiling on the sum of all allocations
    #[serde(default = "default_budget_ceiling")]
    pub budget_ceiling: Decimal,

    /// Upper bound on waiting for a ledger lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Algorithm stamped onto new ledger records
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Register the tracing notification port
    #[serde(default = "default_log_notifications")]
    pub log_notifications: bool,
}

fn default_budget_ceiling() -> Decimal {
    Decimal::new(1_000_000, 0)
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_log_notifications() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            budget_ceiling: default_budget_ceiling(),
            lock_timeout_ms: default_lock_timeout_ms(),
            hash_algorithm: HashAlgorithm::default(),
            log_notifications: default_log_notifications(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (environment-style key/value source)
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(BUDGET_CEILING_ENV) {
            self.budget_ceiling =
                Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidValue {
                    key: BUDGET_CEILING_ENV.to_string(),
                    value,
                })?;
        }
        Ok(self)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            lock_timeout: self.lock_timeout(),
            algorithm: self.hash_algorithm,
        }
    }

    pub fn machine_config(&self) -> Result<MachineConfig, ConfigError> {
        let budget_ceiling =
            Amount::new(self.budget_ceiling).map_err(|_| ConfigError::InvalidValue {
                key: "budget_ceiling".to_string(),
                value: self.budget_ceiling.to_string(),
            })?;
        Ok(MachineConfig { budget_ceiling })
    }
}
