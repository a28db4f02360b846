//! Ledger Store
//!
//! Persistence seam for agents, wallets, referral events and withdrawal
//! requests.
//!
//! # Atomic Units
//!
//! Every wallet mutation happens inside a [`LedgerTx`]:
//!
//! ```text
//! begin() → lock linked record → lock wallet → mutate → save → commit()
//! ```
//!
//! - Locks are taken at first read (`SELECT ... FOR UPDATE` in PostgreSQL)
//! - Lock order is always linked record first, wallet last
//! - Dropping a transaction without `commit()` rolls it back
//! - Every unit is bounded by [`bounded`]; a unit that times out is dropped

pub mod postgres;

#[cfg(test)]
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::agent::{Agent, AgentId, BankDetails, NewAgent};
use crate::error::LedgerError;
use crate::referral::{ReferralEvent, ReferralStatus};
use crate::wallet::Wallet;
use crate::withdrawal::WithdrawalRequest;

pub use postgres::PgLedgerStore;

/// Non-transactional reads plus the entry point for atomic units
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start an atomic unit
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError>;

    /// Insert a new agent with a zero wallet.
    ///
    /// Returns `None` if the referral code is already taken.
    async fn insert_agent(&self, agent: &NewAgent) -> Result<Option<Agent>, LedgerError>;

    async fn agent(&self, agent_id: AgentId) -> Result<Option<Agent>, LedgerError>;

    async fn agent_by_referral_code(&self, code: &str) -> Result<Option<Agent>, LedgerError>;

    async fn update_bank_details(
        &self,
        agent_id: AgentId,
        bank: &BankDetails,
    ) -> Result<bool, LedgerError>;

    async fn withdrawal(&self, request_id: Uuid)
    -> Result<Option<WithdrawalRequest>, LedgerError>;

    /// Withdrawal history, newest first
    async fn withdrawals_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError>;

    /// Referral history, newest first
    async fn events_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError>;

    /// One page of pending referral events, oldest first, strictly after
    /// `after` in `(created_at, event_id)` order
    async fn pending_events(
        &self,
        after: Option<EventCursor>,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError>;
}

/// Keyset position in the pending-event scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventCursor {
    pub created_at: DateTime<Utc>,
    pub event_id: Uuid,
}

impl EventCursor {
    pub fn of(event: &ReferralEvent) -> Self {
        Self {
            created_at: event.created_at,
            event_id: event.event_id,
        }
    }
}

/// One open atomic unit.
///
/// `lock_*` methods return `NotFound` when the row does not exist.
#[async_trait]
pub trait LedgerTx: Send {
    async fn lock_wallet(&mut self, agent_id: AgentId) -> Result<Wallet, LedgerError>;

    async fn save_wallet(&mut self, agent_id: AgentId, wallet: &Wallet)
    -> Result<(), LedgerError>;

    async fn bank_details(&mut self, agent_id: AgentId)
    -> Result<Option<BankDetails>, LedgerError>;

    async fn lock_event(&mut self, event_id: Uuid) -> Result<ReferralEvent, LedgerError>;

    async fn event_exists_for_order(&mut self, order_id: &str) -> Result<bool, LedgerError>;

    async fn insert_event(&mut self, event: &ReferralEvent) -> Result<(), LedgerError>;

    async fn set_event_status(
        &mut self,
        event_id: Uuid,
        status: ReferralStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    async fn lock_withdrawal(&mut self, request_id: Uuid)
    -> Result<WithdrawalRequest, LedgerError>;

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest)
    -> Result<(), LedgerError>;

    /// Persist status, remarks and processed_at of a decided request
    async fn update_withdrawal(&mut self, request: &WithdrawalRequest)
    -> Result<(), LedgerError>;

    /// Requests created by `agent_id` in `[from, to)`
    async fn count_withdrawals_between(
        &mut self,
        agent_id: AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Run one atomic unit with an upper bound on its total duration.
///
/// On expiry the unit's future is dropped, which drops (and rolls back) the
/// transaction it owns.
pub async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(op, timeout_ms = limit.as_millis() as u64, "Ledger operation timed out");
            Err(LedgerError::TransientStore(format!(
                "{} timed out after {}ms",
                op,
                limit.as_millis()
            )))
        }
    }
}
