//! Data models for agents (referral users)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wallet::Wallet;

/// Agent / referral user identifier
pub type AgentId = i64;

/// Payout bank details.
///
/// Withdrawal requests copy this at creation time, so later edits never
/// change where an already requested payout goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_holder: String,
    pub account_number: String,
    pub routing_code: String,
}

impl BankDetails {
    pub fn new(
        bank_name: impl Into<String>,
        account_holder: impl Into<String>,
        account_number: impl Into<String>,
        routing_code: impl Into<String>,
    ) -> Self {
        Self {
            bank_name: bank_name.into(),
            account_holder: account_holder.into(),
            account_number: account_number.into(),
            routing_code: routing_code.into(),
        }
    }

    /// Business-rule check; shape validation happens at the HTTP boundary
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("bank_name", &self.bank_name),
            ("account_holder", &self.account_holder),
            ("account_number", &self.account_number),
            ("routing_code", &self.routing_code),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }

        let digits = self.account_number.trim();
        if !(6..=20).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err("account_number must be 6-20 digits".to_string());
        }

        if !self
            .routing_code
            .trim()
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            return Err("routing_code must be alphanumeric".to_string());
        }

        Ok(())
    }

    /// Account number with all but the last four digits hidden (for logs)
    pub fn masked_account_number(&self) -> String {
        let n = self.account_number.len();
        if n <= 4 {
            return "*".repeat(n);
        }
        format!("{}{}", "*".repeat(n - 4), &self.account_number[n - 4..])
    }
}

/// Agent account with its embedded wallet
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub name: String,
    pub email: Option<String>,
    pub referral_code: String,
    pub bank: Option<BankDetails>,
    pub wallet: Wallet,
    pub created_at: DateTime<Utc>,
}

/// Registration input after a referral code has been drawn
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub email: Option<String>,
    pub referral_code: String,
}
