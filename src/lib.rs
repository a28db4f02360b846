//! referral_ledger - Agent referral and withdrawal ledger
//!
//! Agents earn commission when an order placed with their referral code
//! settles, and withdraw earned funds through an admin-approved workflow.
//!
//! # Modules
//!
//! - [`wallet`] - Four-field wallet with checked mutations
//! - [`agent`] - Agent accounts, referral codes, bank details
//! - [`referral`] - Referral events and the event processor
//! - [`withdrawal`] - Withdrawal rules and the request workflow
//! - [`reconciliation`] - Scheduled job resolving pending referral events
//! - [`store`] - Transactional persistence (PostgreSQL)
//! - [`notify`] - Fire-and-forget ledger notifications
//! - [`error`] - Ledger error taxonomy
//!
//! # Wallet Flow
//!
//! ```text
//! referral recorded ──▶ pending_balance ──(order settles)──▶ balance
//!                             │                                │ withdraw
//!                             ▼ order cancelled                ▼
//!                          released                 pending_withdrawal_amount
//!                                                    approve: paid out
//!                                                    reject:  back to balance
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod store;
pub mod wallet;

pub mod agent;
pub mod reconciliation;
pub mod referral;
pub mod withdrawal;


// Convenient re-exports at crate root
pub use agent::{Agent, AgentId, AgentService, BankDetails};
pub use error::LedgerError;
pub use reconciliation::{JobConfig, ReconcileReport, ReconciliationJob};
pub use referral::{
    OrderOutcome, OrderStatus, ReferralEvent, ReferralEventProcessor, ReferralStatus, Resolution,
};
pub use store::{LedgerStore, LedgerTx, PgLedgerStore};
pub use wallet::{Wallet, WalletError};
pub use withdrawal::{
    Decision, WithdrawalRequest, WithdrawalRules, WithdrawalService, WithdrawalStatus,
};
