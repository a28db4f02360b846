use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::withdrawal::WithdrawalRules;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub withdrawal: WithdrawalConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Upper bound on waiting for a row lock inside a ledger transaction
    pub lock_timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout_ms: 5_000,
            lock_timeout_ms: 3_000,
            statement_timeout_ms: 5_000,
        }
    }
}

/// Withdrawal defaults; the `withdrawal_rules` table overrides the amounts
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WithdrawalConfig {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub max_per_day: u32,
    /// Upper bound on one whole ledger operation, lock waits included
    pub operation_timeout_ms: u64,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            min_amount: Decimal::from(1_000),
            max_amount: Decimal::from(1_000_000),
            max_per_day: 3,
            operation_timeout_ms: 8_000,
        }
    }
}

impl WithdrawalConfig {
    pub fn rules(&self) -> WithdrawalRules {
        WithdrawalRules {
            min_withdrawal_amount: self.min_amount,
            max_withdrawal_amount: self.max_amount,
            max_withdrawals_per_day: self.max_per_day,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            batch_size: 500,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReferralConfig {
    pub code_length: usize,
    /// Regenerate attempts when a drawn code is already taken
    pub max_code_attempts: u32,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            code_length: 8,
            max_code_attempts: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationConfig {
    pub queue_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { queue_size: 1024 }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.withdrawal.rules().validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }
}
