//! Referral Event Processor
//!
//! Records referral attributions and drives each event from PENDING to a
//! terminal state. The status change and the wallet delta commit in one
//! transaction; an event that is already terminal is never touched again,
//! which makes resolution idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{OrderOutcome, ReferralEvent, ReferralStatus, Resolution};
use crate::agent::{AgentId, normalize_code};
use crate::error::LedgerError;
use crate::notify::{LedgerEvent, Notifier};
use crate::store::{LedgerStore, bounded};
use crate::wallet::validate_amount;

pub struct ReferralEventProcessor {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    op_timeout: Duration,
}

impl ReferralEventProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            op_timeout,
        }
    }

    /// A referee used `referral_code` when placing `order_id`.
    ///
    /// Credits the referrer's pending balance and creates the PENDING event
    /// in one transaction. One attribution per order.
    pub async fn record_referral(
        &self,
        referral_code: &str,
        referee_id: AgentId,
        order_id: &str,
        amount: Decimal,
    ) -> Result<ReferralEvent, LedgerError> {
        let amount = validate_amount(amount).map_err(LedgerError::Validation)?;
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(LedgerError::Validation("order_id must not be empty".to_string()));
        }

        let code = normalize_code(referral_code);
        let referrer = self
            .store
            .agent_by_referral_code(&code)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("referral code {}", code)))?;

        if referrer.agent_id == referee_id {
            return Err(LedgerError::Validation(
                "agents cannot use their own referral code".to_string(),
            ));
        }

        let event = ReferralEvent::new(referrer.agent_id, referee_id, code, order_id, amount);

        bounded(self.op_timeout, "record_referral", async {
            let mut tx = self.store.begin().await?;

            if tx.event_exists_for_order(&event.order_id).await? {
                return Err(LedgerError::AlreadyProcessed);
            }

            let mut wallet = tx.lock_wallet(event.referrer_id).await?;
            wallet.credit_pending(event.amount)?;
            tx.save_wallet(event.referrer_id, &wallet).await?;
            tx.insert_event(&event).await?;

            tx.commit().await
        })
        .await?;

        info!(
            event_id = %event.event_id,
            referrer_id = event.referrer_id,
            order_id = %event.order_id,
            amount = %event.amount,
            "Referral recorded"
        );
        self.notifier.notify(LedgerEvent::ReferralCodeUsed {
            event_id: event.event_id,
            referrer_id: event.referrer_id,
            referee_id: event.referee_id,
            order_id: event.order_id.clone(),
            amount: event.amount,
        });

        Ok(event)
    }

    /// Apply the linked order's outcome to one event
    pub async fn resolve(
        &self,
        event_id: Uuid,
        outcome: OrderOutcome,
    ) -> Result<Resolution, LedgerError> {
        let target = match outcome {
            OrderOutcome::Open => return Ok(Resolution::StillOpen),
            OrderOutcome::Succeeded => ReferralStatus::Completed,
            OrderOutcome::Failed => ReferralStatus::Cancelled,
        };

        let event = bounded(self.op_timeout, "resolve_referral", async {
            let mut tx = self.store.begin().await?;

            let event = tx.lock_event(event_id).await?;
            if event.status.is_terminal() {
                // Dropping tx releases the row lock; nothing was written.
                return Ok(event);
            }

            let mut wallet = tx.lock_wallet(event.referrer_id).await?;
            if target == ReferralStatus::Completed {
                wallet.confirm_earning(event.amount)?;
            } else {
                wallet.release_pending_on_cancel(event.amount)?;
            }
            tx.save_wallet(event.referrer_id, &wallet).await?;
            tx.set_event_status(event_id, target, Utc::now()).await?;

            tx.commit().await?;
            Ok::<_, LedgerError>(event)
        })
        .await?;

        if event.status.is_terminal() {
            debug!(event_id = %event_id, status = %event.status, "Referral event already resolved");
            return Ok(Resolution::AlreadyResolved(event.status));
        }

        info!(
            event_id = %event_id,
            referrer_id = event.referrer_id,
            status = %target,
            amount = %event.amount,
            "Referral event resolved"
        );
        self.notifier.notify(LedgerEvent::ReferralResolved {
            event_id,
            referrer_id: event.referrer_id,
            status: target,
            amount: event.amount,
        });

        Ok(match target {
            ReferralStatus::Completed => Resolution::Completed,
            _ => Resolution::Cancelled,
        })
    }

    /// Referral history of an agent, newest first
    pub async fn history(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError> {
        self.store.events_for_agent(agent_id, limit).await
    }
}
