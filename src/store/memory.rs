//! In-memory Ledger Store for tests
//!
//! A transaction takes the single state mutex and works on a copy of the
//! state; `commit()` writes the copy back, dropping the transaction discards
//! it. Holding the mutex for the whole unit serializes all transactions,
//! which is stricter than PostgreSQL row locks but has the same observable
//! result for a single wallet.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{EventCursor, LedgerStore, LedgerTx};
use crate::agent::{Agent, AgentId, BankDetails, NewAgent};
use crate::error::LedgerError;
use crate::referral::{ReferralEvent, ReferralStatus};
use crate::wallet::Wallet;
use crate::withdrawal::WithdrawalRequest;

/// Step at which a transaction can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    SetEventStatus,
    InsertWithdrawal,
    UpdateWithdrawal,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemState {
    next_agent_id: AgentId,
    agents: HashMap<AgentId, Agent>,
    events: HashMap<Uuid, ReferralEvent>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
}

pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemState>>,
    fault: Arc<std::sync::Mutex<Option<FaultPoint>>>,
    commits: Arc<AtomicUsize>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState {
                next_agent_id: 1,
                ..Default::default()
            })),
            fault: Arc::new(std::sync::Mutex::new(None)),
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next transaction that reaches `point` fail once
    pub fn fail_once(&self, point: FaultPoint) {
        *self.fault.lock().unwrap() = Some(point);
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Seed an agent with an arbitrary wallet
    pub async fn seed_agent(
        &self,
        name: &str,
        referral_code: &str,
        wallet: Wallet,
        bank: Option<BankDetails>,
    ) -> AgentId {
        let mut state = self.state.lock().await;
        let agent_id = state.next_agent_id;
        state.next_agent_id += 1;
        state.agents.insert(
            agent_id,
            Agent {
                agent_id,
                name: name.to_string(),
                email: None,
                referral_code: referral_code.to_string(),
                bank,
                wallet,
                created_at: Utc::now(),
            },
        );
        agent_id
    }

    pub async fn seed_event(&self, event: ReferralEvent) {
        self.state
            .lock()
            .await
            .events
            .insert(event.event_id, event);
    }

    pub async fn seed_withdrawal(&self, request: WithdrawalRequest) {
        self.state
            .lock()
            .await
            .withdrawals
            .insert(request.request_id, request);
    }

    pub async fn wallet_of(&self, agent_id: AgentId) -> Wallet {
        self.state.lock().await.agents[&agent_id].wallet
    }

    pub async fn event(&self, event_id: Uuid) -> ReferralEvent {
        self.state.lock().await.events[&event_id].clone()
    }

    pub async fn withdrawal_count(&self) -> usize {
        self.state.lock().await.withdrawals.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            fault: self.fault.clone(),
            commits: self.commits.clone(),
        }))
    }

    async fn insert_agent(&self, agent: &NewAgent) -> Result<Option<Agent>, LedgerError> {
        let mut state = self.state.lock().await;
        if state
            .agents
            .values()
            .any(|a| a.referral_code == agent.referral_code)
        {
            return Ok(None);
        }

        let agent_id = state.next_agent_id;
        state.next_agent_id += 1;
        let created = Agent {
            agent_id,
            name: agent.name.clone(),
            email: agent.email.clone(),
            referral_code: agent.referral_code.clone(),
            bank: None,
            wallet: Wallet::default(),
            created_at: Utc::now(),
        };
        state.agents.insert(agent_id, created.clone());
        Ok(Some(created))
    }

    async fn agent(&self, agent_id: AgentId) -> Result<Option<Agent>, LedgerError> {
        Ok(self.state.lock().await.agents.get(&agent_id).cloned())
    }

    async fn agent_by_referral_code(&self, code: &str) -> Result<Option<Agent>, LedgerError> {
        Ok(self
            .state
            .lock()
            .await
            .agents
            .values()
            .find(|a| a.referral_code == code)
            .cloned())
    }

    async fn update_bank_details(
        &self,
        agent_id: AgentId,
        bank: &BankDetails,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().await;
        match state.agents.get_mut(&agent_id) {
            Some(agent) => {
                agent.bank = Some(bank.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn withdrawal(
        &self,
        request_id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        Ok(self.state.lock().await.withdrawals.get(&request_id).cloned())
    }

    async fn withdrawals_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let state = self.state.lock().await;
        let mut list: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| w.agent_id == agent_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }

    async fn events_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError> {
        let state = self.state.lock().await;
        let mut list: Vec<_> = state
            .events
            .values()
            .filter(|e| e.referrer_id == agent_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }

    async fn pending_events(
        &self,
        after: Option<EventCursor>,
        limit: i64,
    ) -> Result<Vec<ReferralEvent>, LedgerError> {
        let state = self.state.lock().await;
        let mut list: Vec<_> = state
            .events
            .values()
            .filter(|e| e.status == ReferralStatus::Pending)
            .filter(|e| after.is_none_or(|c| EventCursor::of(e) > c))
            .cloned()
            .collect();
        list.sort_by_key(EventCursor::of);
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemState>,
    work: MemState,
    fault: Arc<std::sync::Mutex<Option<FaultPoint>>>,
    commits: Arc<AtomicUsize>,
}

impl MemoryTx {
    fn check_fault(&self, point: FaultPoint) -> Result<(), LedgerError> {
        let mut fault = self.fault.lock().unwrap();
        if *fault == Some(point) {
            *fault = None;
            return Err(LedgerError::Server(format!("injected fault at {:?}", point)));
        }
        Ok(())
    }

    fn agent_mut(&mut self, agent_id: AgentId) -> Result<&mut Agent, LedgerError> {
        self.work
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| LedgerError::NotFound(format!("agent {}", agent_id)))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_wallet(&mut self, agent_id: AgentId) -> Result<Wallet, LedgerError> {
        Ok(self.agent_mut(agent_id)?.wallet)
    }

    async fn save_wallet(
        &mut self,
        agent_id: AgentId,
        wallet: &Wallet,
    ) -> Result<(), LedgerError> {
        if !wallet.is_consistent() {
            return Err(LedgerError::Server("negative wallet".to_string()));
        }
        self.agent_mut(agent_id)?.wallet = *wallet;
        Ok(())
    }

    async fn bank_details(
        &mut self,
        agent_id: AgentId,
    ) -> Result<Option<BankDetails>, LedgerError> {
        Ok(self.agent_mut(agent_id)?.bank.clone())
    }

    async fn lock_event(&mut self, event_id: Uuid) -> Result<ReferralEvent, LedgerError> {
        self.work
            .events
            .get(&event_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("referral event {}", event_id)))
    }

    async fn event_exists_for_order(&mut self, order_id: &str) -> Result<bool, LedgerError> {
        Ok(self.work.events.values().any(|e| e.order_id == order_id))
    }

    async fn insert_event(&mut self, event: &ReferralEvent) -> Result<(), LedgerError> {
        self.work.events.insert(event.event_id, event.clone());
        Ok(())
    }

    async fn set_event_status(
        &mut self,
        event_id: Uuid,
        status: ReferralStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.check_fault(FaultPoint::SetEventStatus)?;
        let event = self
            .work
            .events
            .get_mut(&event_id)
            .ok_or_else(|| LedgerError::NotFound(format!("referral event {}", event_id)))?;
        if event.status != ReferralStatus::Pending {
            return Err(LedgerError::AlreadyProcessed);
        }
        event.status = status;
        event.resolved_at = Some(resolved_at);
        Ok(())
    }

    async fn lock_withdrawal(
        &mut self,
        request_id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        self.work
            .withdrawals
            .get(&request_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("withdrawal request {}", request_id)))
    }

    async fn insert_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> Result<(), LedgerError> {
        self.check_fault(FaultPoint::InsertWithdrawal)?;
        self.work
            .withdrawals
            .insert(request.request_id, request.clone());
        Ok(())
    }

    async fn update_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> Result<(), LedgerError> {
        self.check_fault(FaultPoint::UpdateWithdrawal)?;
        match self.work.withdrawals.get_mut(&request.request_id) {
            Some(stored) if !stored.status.is_terminal() => {
                *stored = request.clone();
                Ok(())
            }
            Some(_) => Err(LedgerError::AlreadyProcessed),
            None => Err(LedgerError::NotFound(format!(
                "withdrawal request {}",
                request.request_id
            ))),
        }
    }

    async fn count_withdrawals_between(
        &mut self,
        agent_id: AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        Ok(self
            .work
            .withdrawals
            .values()
            .filter(|w| w.agent_id == agent_id && w.requested_at >= from && w.requested_at < to)
            .count() as i64)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.check_fault(FaultPoint::Commit)?;
        let MemoryTx {
            mut guard,
            work,
            commits,
            ..
        } = *self;
        *guard = work;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
