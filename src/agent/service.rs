//! Agent registration and account reads

use std::sync::Arc;

use tracing::{info, warn};

use super::models::{Agent, AgentId, BankDetails, NewAgent};
use super::referral_code::generate_code;
use crate::config::ReferralConfig;
use crate::error::LedgerError;
use crate::store::LedgerStore;
use crate::wallet::Wallet;

pub struct AgentService {
    store: Arc<dyn LedgerStore>,
    config: ReferralConfig,
}

impl AgentService {
    pub fn new(store: Arc<dyn LedgerStore>, config: ReferralConfig) -> Self {
        Self { store, config }
    }

    /// Register an agent with a zero wallet and a fresh referral code
    pub async fn register(&self, name: &str, email: Option<&str>) -> Result<Agent, LedgerError> {
        let len = self.config.code_length;
        self.register_with_codes(name, email, || generate_code(&mut rand::thread_rng(), len))
            .await
    }

    async fn register_with_codes<F>(
        &self,
        name: &str,
        email: Option<&str>,
        mut next_code: F,
    ) -> Result<Agent, LedgerError>
    where
        F: FnMut() -> String + Send,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("name must not be empty".to_string()));
        }

        for attempt in 1..=self.config.max_code_attempts {
            let new_agent = NewAgent {
                name: name.to_string(),
                email: email.map(str::to_string),
                referral_code: next_code(),
            };

            match self.store.insert_agent(&new_agent).await? {
                Some(agent) => {
                    info!(
                        agent_id = agent.agent_id,
                        referral_code = %agent.referral_code,
                        "Agent registered"
                    );
                    return Ok(agent);
                }
                None => {
                    warn!(
                        attempt,
                        referral_code = %new_agent.referral_code,
                        "Referral code collision, regenerating"
                    );
                }
            }
        }

        Err(LedgerError::Server(format!(
            "could not allocate a unique referral code after {} attempts",
            self.config.max_code_attempts
        )))
    }

    pub async fn update_bank_details(
        &self,
        agent_id: AgentId,
        bank: BankDetails,
    ) -> Result<(), LedgerError> {
        bank.validate().map_err(LedgerError::Validation)?;

        if !self.store.update_bank_details(agent_id, &bank).await? {
            return Err(LedgerError::NotFound(format!("agent {}", agent_id)));
        }

        info!(
            agent_id,
            account = %bank.masked_account_number(),
            "Bank details updated"
        );
        Ok(())
    }

    pub async fn agent(&self, agent_id: AgentId) -> Result<Agent, LedgerError> {
        self.store
            .agent(agent_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("agent {}", agent_id)))
    }

    pub async fn wallet(&self, agent_id: AgentId) -> Result<Wallet, LedgerError> {
        Ok(self.agent(agent_id).await?.wallet)
    }
}
