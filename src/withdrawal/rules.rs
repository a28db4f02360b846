//! Withdrawal business rules
//!
//! The rules record is managed outside this crate (admin side). It is read
//! once per request and enforced before anything is written.

use std::sync::Arc;

use async_trait::async_trait;
use cached::proc_macro::cached;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRules {
    pub min_withdrawal_amount: Decimal,
    pub max_withdrawal_amount: Decimal,
    pub max_withdrawals_per_day: u32,
}

impl WithdrawalRules {
    /// Reject a misconfigured rules record
    pub fn validate(&self) -> Result<(), String> {
        if self.min_withdrawal_amount <= Decimal::ZERO {
            return Err("min_withdrawal_amount must be greater than zero".to_string());
        }
        if self.min_withdrawal_amount > self.max_withdrawal_amount {
            return Err(format!(
                "min_withdrawal_amount {} exceeds max_withdrawal_amount {}",
                self.min_withdrawal_amount, self.max_withdrawal_amount
            ));
        }
        Ok(())
    }

    /// Range check for a single request
    pub fn check_amount(&self, amount: Decimal) -> Result<(), LedgerError> {
        if amount < self.min_withdrawal_amount {
            return Err(LedgerError::Validation(format!(
                "minimum withdrawal amount is {}",
                self.min_withdrawal_amount
            )));
        }
        if amount > self.max_withdrawal_amount {
            return Err(LedgerError::Validation(format!(
                "maximum withdrawal amount is {}",
                self.max_withdrawal_amount
            )));
        }
        Ok(())
    }
}

/// The daily cap counts requests in the UTC calendar day containing `now`.
///
/// Returns `[start, end)`.
pub fn utc_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Read-only access to the current rules record
#[async_trait]
pub trait RulesSource: Send + Sync {
    async fn withdrawal_rules(&self) -> Result<WithdrawalRules, LedgerError>;
}

/// Fixed rules, typically from configuration
pub struct StaticRules(pub WithdrawalRules);

#[async_trait]
impl RulesSource for StaticRules {
    async fn withdrawal_rules(&self) -> Result<WithdrawalRules, LedgerError> {
        Ok(self.0.clone())
    }
}

/// Rules from the single-row `withdrawal_rules` table.
///
/// Falls back to the configured rules while the row does not exist.
pub struct PgRulesSource {
    pool: Arc<PgPool>,
    fallback: WithdrawalRules,
}

impl PgRulesSource {
    pub fn new(pool: Arc<PgPool>, fallback: WithdrawalRules) -> Self {
        Self { pool, fallback }
    }
}

#[async_trait]
impl RulesSource for PgRulesSource {
    async fn withdrawal_rules(&self) -> Result<WithdrawalRules, LedgerError> {
        let row = load_rules_cached(self.pool.clone())
            .await
            .map_err(LedgerError::TransientStore)?;
        effective_rules(row, &self.fallback)
    }
}

/// Pick the stored rules, or the fallback when no row exists, and reject a
/// record that cannot be enforced
pub fn effective_rules(
    row: Option<WithdrawalRules>,
    fallback: &WithdrawalRules,
) -> Result<WithdrawalRules, LedgerError> {
    let rules = row.unwrap_or_else(|| fallback.clone());
    rules.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid withdrawal rules record");
        LedgerError::Server(e)
    })?;
    Ok(rules)
}

/// Load the rules row with caching
///
/// `time` is the only TTL setting; admin edits show up within 30 seconds.
#[cached(
    time = 30,
    key = "String",
    convert = r#"{ "withdrawal_rules".to_string() }"#,
    result = true
)]
pub async fn load_rules_cached(pool: Arc<PgPool>) -> Result<Option<WithdrawalRules>, String> {
    tracing::debug!("[cache] Loading withdrawal rules from database");
    load_rules(&pool).await
}

/// Read the single rules row, uncached
pub async fn load_rules(pool: &PgPool) -> Result<Option<WithdrawalRules>, String> {
    let row = sqlx::query(
        "SELECT min_withdrawal_amount, max_withdrawal_amount, max_withdrawals_per_day \
         FROM withdrawal_rules WHERE id = 1",
    )
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("Failed to load withdrawal rules: {}", e))?;

    row.map(|r| -> Result<WithdrawalRules, sqlx::Error> {
        let per_day: i32 = r.try_get("max_withdrawals_per_day")?;
        Ok(WithdrawalRules {
            min_withdrawal_amount: r.try_get("min_withdrawal_amount")?,
            max_withdrawal_amount: r.try_get("max_withdrawal_amount")?,
            max_withdrawals_per_day: per_day.max(0) as u32,
        })
    })
    .transpose()
    .map_err(|e| format!("Failed to decode withdrawal rules: {}", e))
}
