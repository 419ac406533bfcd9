//! Commitment engine facade.
//!
//! All mutable state (ledger, commitments, leads, recovery slot) lives in one
//! [`EngineState`] behind a single async mutex. Every mutation runs to
//! completion inside one lock section; external calls (identity, advisory)
//! are awaited with the lock released and their results re-validated after
//! re-locking.
//!
//! Operations are grouped by component: this module holds staking,
//! completion and read models; recovery, lead conversion, deadline
//! evaluation, prospecting and coaching add their own `impl` blocks.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use streak_common::EngineConfig;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::advisory::AdvisoryService;
use crate::error::{EngineError, Result};
use crate::identity::IdentityProvider;
use crate::lead::{Lead, LeadStatus, LeadStore};
use crate::ledger::{Ledger, LedgerEntry, LedgerSnapshot};
use crate::notification::{EngineEvent, EventBus};
use crate::recovery::RecoveryWorkflow;
use crate::task::{
    AccountabilityEntry, Commitment, Completion, DayActivity, ManualCommitment, TaskQuery, TaskStatus,
    TaskStore,
};
use crate::validator::StakeValidator;

/// Days covered by the dashboard activity series.
const ACTIVITY_DAYS: u32 = 7;

/// Engine tunables resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub lead_stake: Decimal,
    pub recovery_fallback_stake: Decimal,
    pub top_up_amount: Decimal,
    pub default_deadline: Duration,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            lead_stake: config.lead_stake,
            recovery_fallback_stake: config.recovery_fallback_stake,
            top_up_amount: config.top_up_amount,
            default_deadline: Duration::hours(config.default_deadline_hours),
        }
    }
}

/// Mutable engine state. Only reachable through the engine lock.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) ledger: Ledger,
    pub(crate) tasks: TaskStore,
    pub(crate) leads: LeadStore,
    pub(crate) recovery: RecoveryWorkflow,
    /// Set when a stake was refused for lack of funds; cleared by a deposit
    pub(crate) top_up_required: Option<Decimal>,
}

impl EngineState {
    fn new(opening_balance: Decimal) -> Result<Self> {
        Ok(Self {
            ledger: Ledger::new(opening_balance)?,
            tasks: TaskStore::new(),
            leads: LeadStore::new(),
            recovery: RecoveryWorkflow::default(),
            top_up_required: None,
        })
    }

    /// Reserve, debit and insert `commitment` as one unit.
    ///
    /// The caller holds the engine lock and has already bound an identity.
    pub(crate) fn stake(
        &mut self,
        validator: &StakeValidator,
        commitment: Commitment,
    ) -> Result<Commitment> {
        let reservation = match validator.reserve(&mut self.ledger, commitment.stake_amount) {
            Ok(r) => r,
            Err(e) => {
                if let EngineError::InsufficientFunds { required, .. } = &e {
                    self.top_up_required = Some(*required);
                }
                return Err(e);
            }
        };
        let balance = self.ledger.debit(reservation, &commitment.id);
        debug!(task_id = %commitment.id, stake = %commitment.stake_amount, balance = %balance, "Commitment staked");
        self.tasks.insert(commitment.clone());
        Ok(commitment)
    }
}

/// Aggregate view for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub balance: Decimal,
    pub stake_at_risk: Decimal,
    pub nearest_deadline: Option<DateTime<Utc>>,
    pub active_lead_commitments: usize,
    pub status_counts: HashMap<TaskStatus, usize>,
    pub identity: Option<String>,
    pub top_up_required: Option<Decimal>,
    pub recovery_pending: bool,
    /// Last seven days, oldest first
    pub week: Vec<DayActivity>,
}

/// The commitment lifecycle engine.
pub struct CommitmentEngine {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) validator: StakeValidator,
    pub(crate) advisory: Arc<dyn AdvisoryService>,
    pub(crate) events: EventBus,
    pub(crate) settings: EngineSettings,
}

impl CommitmentEngine {
    pub fn new(
        config: &EngineConfig,
        advisory: Arc<dyn AdvisoryService>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let events = EventBus::default();
        Ok(Self {
            state: Mutex::new(EngineState::new(config.initial_balance)?),
            validator: StakeValidator::new(identity, events.clone()),
            advisory,
            events,
            settings: EngineSettings::from(config),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ========================================================================
    // Identity and funds
    // ========================================================================

    pub async fn identity(&self) -> Option<String> {
        self.validator.address().await
    }

    /// Bind a wallet identity, acquiring one if needed.
    pub async fn connect_identity(&self) -> Result<String> {
        self.validator.ensure_identity().await
    }

    /// Whether a stake of `amount` would currently be accepted.
    ///
    /// Acquires an identity first when none is bound. Does not move funds.
    pub async fn validate_stake(&self, amount: Decimal) -> bool {
        if self.validator.ensure_identity().await.is_err() {
            return false;
        }
        let mut state = self.state.lock().await;
        match self.validator.check_funds(&state.ledger, amount) {
            Ok(()) => true,
            Err(EngineError::InsufficientFunds { required, .. }) => {
                state.top_up_required = Some(required);
                false
            }
            Err(_) => false,
        }
    }

    pub async fn balance(&self) -> Decimal {
        self.state.lock().await.ledger.balance()
    }

    pub async fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.ledger.snapshot()
    }

    pub async fn ledger_journal(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.ledger.journal().to_vec()
    }

    /// Amount of the last refused stake, until a deposit clears it.
    pub async fn top_up_required(&self) -> Option<Decimal> {
        self.state.lock().await.top_up_required
    }

    /// Credit a top-up; `None` uses the configured amount.
    pub async fn deposit(&self, amount: Option<Decimal>) -> Result<Decimal> {
        let amount = amount.unwrap_or(self.settings.top_up_amount);
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "deposit must be positive, got {}",
                amount
            )));
        }
        let balance = {
            let mut state = self.state.lock().await;
            let balance = state.ledger.credit(amount)?;
            state.top_up_required = None;
            balance
        };
        info!(amount = %amount, balance = %balance, "Deposit credited");
        self.events.publish(EngineEvent::Deposited { amount, balance });
        Ok(balance)
    }

    // ========================================================================
    // Commitments
    // ========================================================================

    /// Create a manual outreach commitment.
    ///
    /// Input is validated before anything else; identity is acquired with
    /// the lock released, then funds are checked and debited atomically.
    pub async fn create_commitment(&self, draft: ManualCommitment) -> Result<Commitment> {
        let commitment = draft.into_commitment(Utc::now())?;
        self.validator.ensure_identity().await?;

        let created = {
            let mut state = self.state.lock().await;
            state.stake(&self.validator, commitment)?
        };

        info!(task_id = %created.id, title = %created.title, stake = %created.stake_amount, "Commitment created");
        self.events.publish(EngineEvent::CommitmentCreated {
            task_id: created.id.clone(),
            title: created.title.clone(),
            stake: created.stake_amount,
        });
        Ok(created)
    }

    /// Complete a commitment today.
    pub async fn complete(&self, task_id: &str) -> Result<Commitment> {
        let now = Utc::now();
        self.complete_on(task_id, now.date_naive(), now).await
    }

    /// Complete a commitment on a given calendar day.
    pub async fn complete_on(
        &self,
        task_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Commitment> {
        let completion = {
            let mut state = self.state.lock().await;
            let completion = state.tasks.complete(task_id, today, now)?;
            if let Completion::Completed(task) = &completion {
                state.ledger.record_clear(task.stake_amount, &task.id);
                if let Some(lead_id) = task.lead_id.as_deref() {
                    if let Ok(lead) = state.leads.get_mut(lead_id) {
                        lead.status = LeadStatus::Sent;
                    }
                }
            }
            completion
        };

        match completion {
            Completion::Completed(task) => {
                info!(task_id = %task.id, streak = task.streak, "Commitment completed");
                self.events.publish(EngineEvent::CommitmentCompleted {
                    task_id: task.id.clone(),
                    streak: task.streak,
                });
                Ok(task)
            }
            Completion::Unchanged(task) => {
                debug!(task_id = %task.id, "Already completed today");
                Ok(task)
            }
        }
    }

    // ========================================================================
    // Read models
    // ========================================================================

    pub async fn task(&self, task_id: &str) -> Option<Commitment> {
        self.state.lock().await.tasks.get(task_id).cloned()
    }

    pub async fn tasks(&self) -> Vec<Commitment> {
        self.state.lock().await.tasks.all().to_vec()
    }

    pub async fn query_tasks(&self, query: &TaskQuery) -> Vec<Commitment> {
        self.state.lock().await.tasks.query(query, Utc::now())
    }

    pub async fn missed_tasks(&self) -> Vec<Commitment> {
        self.state.lock().await.tasks.missed()
    }

    pub async fn accountability_log(&self) -> Vec<AccountabilityEntry> {
        self.state.lock().await.tasks.accountability_log().to_vec()
    }

    pub async fn leads(&self) -> Vec<Lead> {
        self.state.lock().await.leads.all().to_vec()
    }

    pub async fn lead(&self, lead_id: &str) -> Option<Lead> {
        self.state.lock().await.leads.get(lead_id).cloned()
    }

    /// Remove a lead. Commitments linked to it are kept.
    pub async fn remove_lead(&self, lead_id: &str) -> Result<Lead> {
        self.state
            .lock()
            .await
            .leads
            .remove(lead_id)
            .ok_or_else(|| EngineError::NotFound(format!("lead {}", lead_id)))
    }

    pub async fn dashboard(&self) -> DashboardSnapshot {
        let identity = self.validator.address().await;
        let state = self.state.lock().await;
        DashboardSnapshot {
            balance: state.ledger.balance(),
            stake_at_risk: state.tasks.stake_at_risk(),
            nearest_deadline: state.tasks.nearest_deadline(),
            active_lead_commitments: state
                .tasks
                .all()
                .iter()
                .filter(|t| t.is_active() && t.is_lead_derived())
                .count(),
            status_counts: state.tasks.status_counts(),
            identity,
            top_up_required: state.top_up_required,
            recovery_pending: !state.recovery.is_idle(),
            week: state.tasks.daily_activity(Utc::now(), ACTIVITY_DAYS),
        }
    }
}
