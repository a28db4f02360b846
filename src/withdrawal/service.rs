//! Withdrawal Request Workflow
//!
//! # Flow
//!
//! ```text
//! request_withdrawal:  rules check → [lock wallet → daily cap → bank → lock funds → insert] → commit
//! decision:            [lock request → status → lock wallet → finalize] → commit
//! ```
//!
//! Brackets mark one atomic unit. Funds leave `balance` at request time and
//! sit in `pending_withdrawal_amount` until the decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::rules::{RulesSource, utc_day_window};
use super::types::{Decision, WithdrawalRequest};
use crate::agent::AgentId;
use crate::error::LedgerError;
use crate::notify::{LedgerEvent, Notifier};
use crate::store::{LedgerStore, bounded};
use crate::wallet::validate_amount;

pub struct WithdrawalService {
    store: Arc<dyn LedgerStore>,
    rules: Arc<dyn RulesSource>,
    notifier: Arc<dyn Notifier>,
    op_timeout: Duration,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        rules: Arc<dyn RulesSource>,
        notifier: Arc<dyn Notifier>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            rules,
            notifier,
            op_timeout,
        }
    }

    /// Create a pending withdrawal and lock its funds
    pub async fn request_withdrawal(
        &self,
        agent_id: AgentId,
        amount: Decimal,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let amount = validate_amount(amount).map_err(LedgerError::Validation)?;
        let rules = self.rules.withdrawal_rules().await?;
        rules.check_amount(amount)?;

        let request = bounded(self.op_timeout, "request_withdrawal", async {
            let mut tx = self.store.begin().await?;

            let mut wallet = tx.lock_wallet(agent_id).await?;

            let (day_start, day_end) = utc_day_window(Utc::now());
            let today = tx
                .count_withdrawals_between(agent_id, day_start, day_end)
                .await?;
            if today >= i64::from(rules.max_withdrawals_per_day) {
                warn!(
                    agent_id,
                    today,
                    limit = rules.max_withdrawals_per_day,
                    "Daily withdrawal limit reached"
                );
                return Err(LedgerError::RateLimitExceeded);
            }

            let bank = tx.bank_details(agent_id).await?.ok_or_else(|| {
                LedgerError::Validation("bank details are required to withdraw".to_string())
            })?;

            wallet.lock_for_withdrawal(amount)?;
            tx.save_wallet(agent_id, &wallet).await?;

            let request = WithdrawalRequest::new(agent_id, amount, bank);
            tx.insert_withdrawal(&request).await?;

            tx.commit().await?;
            Ok::<_, LedgerError>(request)
        })
        .await?;

        info!(
            request_id = %request.request_id,
            agent_id,
            amount = %amount,
            account = %request.bank.masked_account_number(),
            "Withdrawal requested"
        );
        self.notifier.notify(LedgerEvent::WithdrawalRequested {
            request_id: request.request_id,
            agent_id,
            amount,
        });

        Ok(request)
    }

    /// Approve or reject a pending request. A request is decided once.
    pub async fn process_withdrawal_decision(
        &self,
        request_id: Uuid,
        decision: Decision,
        remarks: Option<String>,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let remarks = remarks
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let request = bounded(self.op_timeout, "process_withdrawal_decision", async {
            let mut tx = self.store.begin().await?;

            let mut request = tx.lock_withdrawal(request_id).await?;
            if request.status.is_terminal() {
                return Err(LedgerError::AlreadyProcessed);
            }

            request.status = decision.status();
            request.processed_at = Some(Utc::now());
            request.remarks = remarks;
            tx.update_withdrawal(&request).await?;

            let mut wallet = tx.lock_wallet(request.agent_id).await?;
            wallet.finalize_withdrawal(request.amount, decision.is_approved())?;
            tx.save_wallet(request.agent_id, &wallet).await?;

            tx.commit().await?;
            Ok::<_, LedgerError>(request)
        })
        .await?;

        info!(
            request_id = %request_id,
            agent_id = request.agent_id,
            status = %request.status,
            amount = %request.amount,
            "Withdrawal processed"
        );
        self.notifier.notify(LedgerEvent::WithdrawalProcessed {
            request_id,
            agent_id: request.agent_id,
            status: request.status,
            amount: request.amount,
        });

        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<WithdrawalRequest, LedgerError> {
        self.store
            .withdrawal(request_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("withdrawal request {}", request_id)))
    }

    /// Withdrawal history of an agent, newest first
    pub async fn history(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        self.store.withdrawals_for_agent(agent_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::BankDetails;
    use crate::notify::recording::RecordingNotifier;
    use crate::store::memory::{FaultPoint, InMemoryLedgerStore};
    use crate::wallet::Wallet;
    use crate::withdrawal::{StaticRules, WithdrawalRules, WithdrawalStatus};

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn rules() -> WithdrawalRules {
        WithdrawalRules {
            min_withdrawal_amount: d(1000),
            max_withdrawal_amount: d(100_000),
            max_withdrawals_per_day: 3,
        }
    }

    fn bank() -> BankDetails {
        BankDetails::new("First Bank", "Ada Obi", "0123456789", "FBN01")
    }

    struct Harness {
        store: Arc<InMemoryLedgerStore>,
        notifier: Arc<RecordingNotifier>,
        service: WithdrawalService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryLedgerStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = WithdrawalService::new(
            store.clone(),
            Arc::new(StaticRules(rules())),
            notifier.clone(),
            Duration::from_secs(2),
        );
        Harness {
            store,
            notifier,
            service,
        }
    }

    async fn agent(h: &Harness, balance: i64, with_bank: bool) -> AgentId {
        let wallet = Wallet::from_parts(d(balance), d(0), d(0), d(0)).unwrap();
        h.store
            .seed_agent("Ada", "ADA23456", wallet, with_bank.then(bank))
            .await
    }

    #[tokio::test]
    async fn test_request_locks_funds() {
        let h = harness();
        let id = agent(&h, 5000, true).await;

        let req = h.service.request_withdrawal(id, d(2000)).await.unwrap();
        assert_eq!(req.status, WithdrawalStatus::Pending);
        assert_eq!(req.bank, bank());

        let wallet = h.store.wallet_of(id).await;
        assert_eq!(wallet.balance(), d(3000));
        assert_eq!(wallet.pending_withdrawal_amount(), d(2000));
        assert_eq!(h.notifier.kinds(), vec!["withdrawal_requested"]);
    }

    #[tokio::test]
    async fn test_request_amount_bounds() {
        let h = harness();
        let id = agent(&h, 500_000, true).await;

        for amount in [d(999), d(100_001), d(0), d(-5), Decimal::new(150_001, 3)] {
            assert!(
                matches!(
                    h.service.request_withdrawal(id, amount).await,
                    Err(LedgerError::Validation(_))
                ),
                "amount {} should be rejected",
                amount
            );
        }
        assert_eq!(h.store.withdrawal_count().await, 0);

        h.service.request_withdrawal(id, d(1000)).await.unwrap();
        h.service.request_withdrawal(id, d(100_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_request_insufficient_balance() {
        let h = harness();
        let id = agent(&h, 1500, true).await;

        let err = h.service.request_withdrawal(id, d(2000)).await.unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance);
        assert_eq!(h.store.wallet_of(id).await.balance(), d(1500));
        assert_eq!(h.store.withdrawal_count().await, 0);
    }

    #[tokio::test]
    async fn test_request_requires_bank_details() {
        let h = harness();
        let id = agent(&h, 5000, false).await;

        assert!(matches!(
            h.service.request_withdrawal(id, d(2000)).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(h.store.wallet_of(id).await.balance(), d(5000));
    }

    #[tokio::test]
    async fn test_request_unknown_agent() {
        let h = harness();
        assert!(matches!(
            h.service.request_withdrawal(77, d(2000)).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_daily_cap() {
        let h = harness();
        let id = agent(&h, 50_000, true).await;

        for _ in 0..3 {
            h.service.request_withdrawal(id, d(1000)).await.unwrap();
        }
        let err = h.service.request_withdrawal(id, d(1000)).await.unwrap_err();
        assert_eq!(err, LedgerError::RateLimitExceeded);
        assert_eq!(h.store.wallet_of(id).await.balance(), d(47_000));
    }

    #[tokio::test]
    async fn test_daily_cap_counts_decided_requests() {
        let h = harness();
        let id = agent(&h, 50_000, true).await;

        for _ in 0..3 {
            let req = h.service.request_withdrawal(id, d(1000)).await.unwrap();
            h.service
                .process_withdrawal_decision(req.request_id, Decision::Rejected, None)
                .await
                .unwrap();
        }
        assert_eq!(
            h.service.request_withdrawal(id, d(1000)).await.unwrap_err(),
            LedgerError::RateLimitExceeded
        );
    }

    #[tokio::test]
    async fn test_daily_cap_ignores_previous_days() {
        let h = harness();
        let id = agent(&h, 50_000, true).await;

        for _ in 0..3 {
            let mut old = WithdrawalRequest::new(id, d(1000), bank());
            old.requested_at = Utc::now() - chrono::Duration::days(1);
            h.store.seed_withdrawal(old).await;
        }
        h.service.request_withdrawal(id, d(1000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_approve() {
        let h = harness();
        let id = agent(&h, 5000, true).await;
        let req = h.service.request_withdrawal(id, d(2000)).await.unwrap();

        let done = h
            .service
            .process_withdrawal_decision(req.request_id, Decision::Approved, Some(" paid ".into()))
            .await
            .unwrap();
        assert_eq!(done.status, WithdrawalStatus::Approved);
        assert_eq!(done.remarks.as_deref(), Some("paid"));
        assert!(done.processed_at.is_some());

        let wallet = h.store.wallet_of(id).await;
        assert_eq!(wallet.balance(), d(3000));
        assert_eq!(wallet.pending_withdrawal_amount(), d(0));
        assert_eq!(wallet.total_earning_amount(), d(2000));
        assert_eq!(h.service.get(req.request_id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn test_reject_refunds() {
        let h = harness();
        let id = agent(&h, 5000, true).await;
        let req = h.service.request_withdrawal(id, d(2000)).await.unwrap();

        h.service
            .process_withdrawal_decision(req.request_id, Decision::Rejected, None)
            .await
            .unwrap();

        let wallet = h.store.wallet_of(id).await;
        assert_eq!(wallet.balance(), d(5000));
        assert_eq!(wallet.pending_withdrawal_amount(), d(0));
        assert_eq!(wallet.total_earning_amount(), d(0));
    }

    #[tokio::test]
    async fn test_decision_is_final() {
        let h = harness();
        let id = agent(&h, 5000, true).await;
        let req = h.service.request_withdrawal(id, d(2000)).await.unwrap();

        h.service
            .process_withdrawal_decision(req.request_id, Decision::Approved, None)
            .await
            .unwrap();
        let after = h.store.wallet_of(id).await;

        let err = h
            .service
            .process_withdrawal_decision(req.request_id, Decision::Rejected, None)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyProcessed);
        assert_eq!(h.store.wallet_of(id).await, after);
        assert_eq!(
            h.notifier.kinds(),
            vec!["withdrawal_requested", "withdrawal_processed"]
        );
    }

    #[tokio::test]
    async fn test_decision_unknown_request() {
        let h = harness();
        assert!(matches!(
            h.service
                .process_withdrawal_decision(Uuid::new_v4(), Decision::Approved, None)
                .await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            h.service.get(Uuid::new_v4()).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_lock() {
        let h = harness();
        let id = agent(&h, 5000, true).await;

        h.store.fail_once(FaultPoint::InsertWithdrawal);
        assert!(h.service.request_withdrawal(id, d(2000)).await.is_err());

        let wallet = h.store.wallet_of(id).await;
        assert_eq!(wallet.balance(), d(5000));
        assert_eq!(wallet.pending_withdrawal_amount(), d(0));
        assert_eq!(h.store.withdrawal_count().await, 0);
        assert!(h.notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_request_pending() {
        let h = harness();
        let id = agent(&h, 5000, true).await;
        let req = h.service.request_withdrawal(id, d(2000)).await.unwrap();

        h.store.fail_once(FaultPoint::Commit);
        assert!(
            h.service
                .process_withdrawal_decision(req.request_id, Decision::Approved, None)
                .await
                .is_err()
        );
        assert_eq!(
            h.service.get(req.request_id).await.unwrap().status,
            WithdrawalStatus::Pending
        );
        assert_eq!(h.store.wallet_of(id).await.pending_withdrawal_amount(), d(2000));
    }

    #[tokio::test]
    async fn test_history() {
        let h = harness();
        let id = agent(&h, 5000, true).await;
        let first = h.service.request_withdrawal(id, d(1000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = h.service.request_withdrawal(id, d(1500)).await.unwrap();

        let history = h.service.history(id, 10).await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.request_id).collect::<Vec<_>>(),
            vec![second.request_id, first.request_id]
        );
        assert_eq!(h.service.history(id, 1).await.unwrap().len(), 1);
    }
}
