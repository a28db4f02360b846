//! Referral events
//!
//! A referral event ties one referee order to the referrer's wallet. The
//! commission sits in `pending_balance` until the order settles.

pub mod orders;
pub mod processor;
pub mod types;

pub use orders::{OrderStatusSource, PgOrderStatusSource, StaticOrderStatus};
pub use processor::ReferralEventProcessor;
pub use types::{OrderOutcome, OrderStatus, ReferralEvent, ReferralStatus, Resolution};
