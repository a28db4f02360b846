//! Ledger notifications
//!
//! Fire-and-forget: the ledger never waits on delivery. Events go into a
//! bounded queue; when it is full the event is dropped with a warning.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::referral::ReferralStatus;
use crate::withdrawal::WithdrawalStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    ReferralCodeUsed {
        event_id: Uuid,
        referrer_id: AgentId,
        referee_id: AgentId,
        order_id: String,
        amount: Decimal,
    },
    ReferralResolved {
        event_id: Uuid,
        referrer_id: AgentId,
        status: ReferralStatus,
        amount: Decimal,
    },
    WithdrawalRequested {
        request_id: Uuid,
        agent_id: AgentId,
        amount: Decimal,
    },
    WithdrawalProcessed {
        request_id: Uuid,
        agent_id: AgentId,
        status: WithdrawalStatus,
        amount: Decimal,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ReferralCodeUsed { .. } => "referral_code_used",
            LedgerEvent::ReferralResolved { .. } => "referral_resolved",
            LedgerEvent::WithdrawalRequested { .. } => "withdrawal_requested",
            LedgerEvent::WithdrawalProcessed { .. } => "withdrawal_processed",
        }
    }
}

/// Must not block
pub trait Notifier: Send + Sync {
    fn notify(&self, event: LedgerEvent);
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: LedgerEvent) {}
}

/// Bounded-queue notifier
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<LedgerEvent>,
}

impl ChannelNotifier {
    pub fn new(queue_size: usize) -> (Self, mpsc::Receiver<LedgerEvent>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: LedgerEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(ev) => ("queue full", ev),
                mpsc::error::TrySendError::Closed(ev) => ("queue closed", ev),
            };
            warn!(kind = event.kind(), reason, "Dropping ledger notification");
        }
    }
}

/// Drain the queue into the log. Delivery to users is handled downstream
/// of this stream.
pub fn spawn_log_sink(mut rx: mpsc::Receiver<LedgerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => info!(kind = event.kind(), %payload, "Ledger notification"),
                Err(e) => warn!(kind = event.kind(), error = %e, "Unserializable notification"),
            }
        }
    })
}
