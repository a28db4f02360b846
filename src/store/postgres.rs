//! PostgreSQL Ledger Store
//!
//! Wallet columns live on `agents`; one `SELECT ... FOR UPDATE` on the agent
//! row serializes every mutation of that agent's wallet.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{EventCursor, LedgerStore, LedgerTx};
use crate::agent::{Agent, AgentId, BankDetails, NewAgent};
use crate::db::Database;
use crate::error::LedgerError;
use crate::referral::{ReferralEvent, ReferralStatus};
use crate::wallet::Wallet;
use crate::withdrawal::{WithdrawalRequest, WithdrawalStatus};

const AGENT_COLUMNS: &str = "agent_id, name, email, referral_code, \
     bank_name, account_holder, account_number, routing_code, \
     balance, pending_balance, pending_withdrawal_amount, total_earning_amount, created_at";

const EVENT_COLUMNS: &str = "event_id, referrer_id, referee_id, referral_code, order_id, \
     amount, status, created_at, resolved_at";

const WITHDRAWAL_COLUMNS: &str = "request_id, agent_id, amount, status, \
     bank_name, account_holder, account_number, routing_code, \
     remarks, requested_at, processed_at";

/// PostgreSQL-backed ledger store
pub struct PgLedgerStore {
    db: Arc<Database>,
}

impl PgLedgerStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        let tx = self.db.begin_bounded().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn insert_agent(&self, agent: &NewAgent) -> Result<Option<Agent>, LedgerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO agents (name, email, referral_code)
            VALUES ($1, $2, $3)
            ON CONFLICT (referral_code) DO NOTHING
            RETURNING agent_id, created_at
            "#,
        )
        .bind(&agent.name)
        .bind(&agent.email)
        .bind(&agent.referral_code)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Agent {
            agent_id: row.try_get("agent_id")?,
            name: agent.name.clone(),
            email: agent.email.clone(),
            referral_code: agent.referral_code.clone(),
            bank: None,
            wallet: Wallet::default(),
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn agent(&self, agent_id: AgentId) -> Result<Option<Agent>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE agent_id = $1",
            AGENT_COLUMNS
        ))
        .bind(agent_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn agent_by_referral_code(&self, code: &str) -> Result<Option<Agent>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE referral_code = $1",
            AGENT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn update_bank_details(
        &self,
        agent_id: AgentId,
        bank: &BankDetails,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE agents
            SET bank_name = $1, account_holder = $2, account_number = $3, routing_code = $4,
                updated_at = NOW()
            WHERE agent_id = $5
            "#,
        )
        .bind(&bank.bank_name)
        .bind(&bank.account_holder)
        .bind(&bank.account_number)
        .bind(&bank.routing_code)
        .bind(agent_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn withdrawal(
        &self,
        request_id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM withdrawal_requests WHERE request_id = $1",
            WITHDRAWAL_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn withdrawals_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM withdrawal_requests WHERE agent_id = $1 \
             ORDER BY requested_at DESC LIMIT $2",
            WITHDRAWAL_COLUMNS
        ))
        .bind(agent_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(withdrawal_from_row).collect()
    }

    async fn events_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM referral_events WHERE referrer_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
            EVENT_COLUMNS
        ))
        .bind(agent_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn pending_events(
        &self,
        after: Option<EventCursor>,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM referral_events WHERE status = 'pending' \
             AND ($1::timestamptz IS NULL OR (created_at, event_id) > ($1, $2)) \
             ORDER BY created_at ASC, event_id ASC LIMIT $3",
            EVENT_COLUMNS
        ))
        .bind(after.map(|c| c.created_at))
        .bind(after.map(|c| c.event_id))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(event_from_row).collect()
    }
}

/// Open PostgreSQL transaction; rolled back by sqlx when dropped uncommitted
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_wallet(&mut self, agent_id: AgentId) -> Result<Wallet, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT balance, pending_balance, pending_withdrawal_amount, total_earning_amount
            FROM agents WHERE agent_id = $1
            FOR UPDATE
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("agent {}", agent_id)))?;

        wallet_from_row(&row, agent_id)
    }

    async fn save_wallet(
        &mut self,
        agent_id: AgentId,
        wallet: &Wallet,
    ) -> Result<(), LedgerError> {
        if !wallet.is_consistent() {
            return Err(LedgerError::Server(format!(
                "refusing to store negative wallet for agent {}",
                agent_id
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE agents
            SET balance = $1, pending_balance = $2, pending_withdrawal_amount = $3,
                total_earning_amount = $4, updated_at = NOW()
            WHERE agent_id = $5
            "#,
        )
        .bind(wallet.balance())
        .bind(wallet.pending_balance())
        .bind(wallet.pending_withdrawal_amount())
        .bind(wallet.total_earning_amount())
        .bind(agent_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("agent {}", agent_id)));
        }
        Ok(())
    }

    async fn bank_details(
        &mut self,
        agent_id: AgentId,
    ) -> Result<Option<BankDetails>, LedgerError> {
        let row = sqlx::query(
            "SELECT bank_name, account_holder, account_number, routing_code \
             FROM agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("agent {}", agent_id)))?;

        bank_from_row(&row)
    }

    async fn lock_event(&mut self, event_id: Uuid) -> Result<ReferralEvent, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM referral_events WHERE event_id = $1 FOR UPDATE",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("referral event {}", event_id)))?;

        event_from_row(&row)
    }

    async fn event_exists_for_order(&mut self, order_id: &str) -> Result<bool, LedgerError> {
        let exists = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM referral_events WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(exists.is_some())
    }

    async fn insert_event(&mut self, event: &ReferralEvent) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO referral_events
                (event_id, referrer_id, referee_id, referral_code, order_id, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id)
        .bind(event.referrer_id)
        .bind(event.referee_id)
        .bind(&event.referral_code)
        .bind(&event.order_id)
        .bind(event.amount)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(unique_violation_as_processed)?;

        Ok(())
    }

    async fn set_event_status(
        &mut self,
        event_id: Uuid,
        status: ReferralStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE referral_events
            SET status = $1, resolved_at = $2
            WHERE event_id = $3 AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(resolved_at)
        .bind(event_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyProcessed);
        }
        Ok(())
    }

    async fn lock_withdrawal(
        &mut self,
        request_id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM withdrawal_requests WHERE request_id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("withdrawal request {}", request_id)))?;

        withdrawal_from_row(&row)
    }

    async fn insert_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests
                (request_id, agent_id, amount, status,
                 bank_name, account_holder, account_number, routing_code, requested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.request_id)
        .bind(request.agent_id)
        .bind(request.amount)
        .bind(request.status.as_str())
        .bind(&request.bank.bank_name)
        .bind(&request.bank.account_holder)
        .bind(&request.bank.account_number)
        .bind(&request.bank.routing_code)
        .bind(request.requested_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = $1, remarks = $2, processed_at = $3
            WHERE request_id = $4 AND status = 'pending'
            "#,
        )
        .bind(request.status.as_str())
        .bind(&request.remarks)
        .bind(request.processed_at)
        .bind(request.request_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyProcessed);
        }
        Ok(())
    }

    async fn count_withdrawals_between(
        &mut self,
        agent_id: AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM withdrawal_requests
            WHERE agent_id = $1 AND requested_at >= $2 AND requested_at < $3
            "#,
        )
        .bind(agent_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn unique_violation_as_processed(e: sqlx::Error) -> LedgerError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            LedgerError::AlreadyProcessed
        }
        _ => e.into(),
    }
}

fn wallet_from_row(row: &PgRow, agent_id: AgentId) -> Result<Wallet, LedgerError> {
    Wallet::from_parts(
        row.try_get::<Decimal, _>("balance")?,
        row.try_get::<Decimal, _>("pending_balance")?,
        row.try_get::<Decimal, _>("pending_withdrawal_amount")?,
        row.try_get::<Decimal, _>("total_earning_amount")?,
    )
    .ok_or_else(|| LedgerError::Server(format!("corrupt wallet for agent {}", agent_id)))
}

fn bank_from_row(row: &PgRow) -> Result<Option<BankDetails>, LedgerError> {
    let bank_name: Option<String> = row.try_get("bank_name")?;
    let account_holder: Option<String> = row.try_get("account_holder")?;
    let account_number: Option<String> = row.try_get("account_number")?;
    let routing_code: Option<String> = row.try_get("routing_code")?;

    Ok(match (bank_name, account_holder, account_number, routing_code) {
        (Some(bank_name), Some(account_holder), Some(account_number), Some(routing_code)) => {
            Some(BankDetails {
                bank_name,
                account_holder,
                account_number,
                routing_code,
            })
        }
        _ => None,
    })
}

fn agent_from_row(row: &PgRow) -> Result<Agent, LedgerError> {
    let agent_id: AgentId = row.try_get("agent_id")?;
    Ok(Agent {
        agent_id,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        referral_code: row.try_get("referral_code")?,
        bank: bank_from_row(row)?,
        wallet: wallet_from_row(row, agent_id)?,
        created_at: row.try_get("created_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<ReferralEvent, LedgerError> {
    let status: String = row.try_get("status")?;
    Ok(ReferralEvent {
        event_id: row.try_get("event_id")?,
        referrer_id: row.try_get("referrer_id")?,
        referee_id: row.try_get("referee_id")?,
        referral_code: row.try_get("referral_code")?,
        order_id: row.try_get("order_id")?,
        amount: row.try_get("amount")?,
        status: status.parse::<ReferralStatus>().map_err(LedgerError::Server)?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> Result<WithdrawalRequest, LedgerError> {
    let status: String = row.try_get("status")?;
    Ok(WithdrawalRequest {
        request_id: row.try_get("request_id")?,
        agent_id: row.try_get("agent_id")?,
        amount: row.try_get("amount")?,
        status: status
            .parse::<WithdrawalStatus>()
            .map_err(LedgerError::Server)?,
        bank: BankDetails {
            bank_name: row.try_get("bank_name")?,
            account_holder: row.try_get("account_holder")?,
            account_number: row.try_get("account_number")?,
            routing_code: row.try_get("routing_code")?,
        },
        remarks: row.try_get("remarks")?,
        requested_at: row.try_get("requested_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}
