//! Referral event state and order-status classification
//!
//! ```text
//! PENDING ──(order delivered/completed)──▶ COMPLETED
//!    │
//!    └────(order cancelled/refunded)─────▶ CANCELLED
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::agent::AgentId;

/// Referral event states. Terminal: COMPLETED, CANCELLED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ReferralStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReferralStatus::Pending)
    }

    /// Value stored in `referral_events.status`
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Completed => "completed",
            ReferralStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReferralStatus::Pending),
            "completed" => Ok(ReferralStatus::Completed),
            "cancelled" => Ok(ReferralStatus::Cancelled),
            _ => Err(format!("Invalid referral status: {}", s)),
        }
    }
}

/// Order lifecycle states as reported by the order subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Refunded,
}

/// The part of an order's status the referral processor cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    Open,
    Succeeded,
    Failed,
}

impl OrderStatus {
    pub fn outcome(&self) -> OrderOutcome {
        match self {
            OrderStatus::Delivered | OrderStatus::Completed => OrderOutcome::Succeeded,
            OrderStatus::Cancelled | OrderStatus::Refunded => OrderOutcome::Failed,
            OrderStatus::Pending
            | OrderStatus::Confirmed
            | OrderStatus::Processing
            | OrderStatus::Shipped => OrderOutcome::Open,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

/// One referral attribution tied to an order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralEvent {
    pub event_id: Uuid,
    pub referrer_id: AgentId,
    pub referee_id: AgentId,
    pub referral_code: String,
    pub order_id: String,
    pub amount: Decimal,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReferralEvent {
    pub fn new(
        referrer_id: AgentId,
        referee_id: AgentId,
        referral_code: impl Into<String>,
        order_id: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            referrer_id,
            referee_id,
            referral_code: referral_code.into(),
            order_id: order_id.into(),
            amount,
            status: ReferralStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Result of asking the processor to resolve one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Cancelled,
    /// Order not terminal yet; nothing written
    StillOpen,
    /// Event was already terminal; nothing written
    AlreadyResolved(ReferralStatus),
}
