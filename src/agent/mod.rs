//! Agent (referral user) accounts

pub mod models;
pub mod referral_code;
pub mod service;

pub use models::{Agent, AgentId, BankDetails, NewAgent};
pub use referral_code::{generate_code, normalize_code};
pub use service::AgentService;
