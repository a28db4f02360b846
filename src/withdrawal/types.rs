//! Withdrawal request records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::agent::{AgentId, BankDetails};

/// Withdrawal states. Terminal: APPROVED, REJECTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "approved" => Ok(WithdrawalStatus::Approved),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            _ => Err(format!("Invalid withdrawal status: {}", s)),
        }
    }
}

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }

    pub fn status(&self) -> WithdrawalStatus {
        match self {
            Decision::Approved => WithdrawalStatus::Approved,
            Decision::Rejected => WithdrawalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalRequest {
    pub request_id: Uuid,
    pub agent_id: AgentId,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    /// Copied from the agent at creation time
    pub bank: BankDetails,
    pub remarks: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    pub fn new(agent_id: AgentId, amount: Decimal, bank: BankDetails) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            agent_id,
            amount,
            status: WithdrawalStatus::Pending,
            bank,
            remarks: None,
            requested_at: Utc::now(),
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(WithdrawalStatus::Approved.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_decision_status() {
        assert_eq!(Decision::Approved.status(), WithdrawalStatus::Approved);
        assert_eq!(Decision::Rejected.status(), WithdrawalStatus::Rejected);
        assert!(Decision::Approved.is_approved());
        assert!(!Decision::Rejected.is_approved());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("approved".parse(), Ok(WithdrawalStatus::Approved));
        assert!("APPROVED".parse::<WithdrawalStatus>().is_err());
    }
}
