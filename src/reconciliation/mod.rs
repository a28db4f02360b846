//! Scheduled reconciliation of pending referral events

pub mod job;

pub use job::{JobConfig, ReconcileReport, ReconciliationJob};
