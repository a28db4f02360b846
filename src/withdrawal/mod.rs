//! Withdrawals
//!
//! ```text
//! PENDING ──(approve)──▶ APPROVED
//!    │
//!    └─────(reject)────▶ REJECTED   (funds back to balance)
//! ```

pub mod rules;
pub mod service;
pub mod types;

pub use rules::{PgRulesSource, RulesSource, StaticRules, WithdrawalRules, utc_day_window};
pub use service::WithdrawalService;
pub use types::{Decision, WithdrawalRequest, WithdrawalStatus};
