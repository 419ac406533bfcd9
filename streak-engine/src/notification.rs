//! Engine notifications.
//!
//! Components publish [`EngineEvent`]s on a broadcast channel; presentation
//! layers subscribe and render them. Publishing never blocks and never fails
//! when nobody is listening.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity; slow subscribers see `Lagged` beyond this.
const DEFAULT_CAPACITY: usize = 100;

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Reminder window for an active commitment opened
    Reminder {
        task_id: String,
        title: String,
        deadline: DateTime<Utc>,
    },
    /// Deadline passed without completion; stake forfeited
    DeadlineMissed {
        task_id: String,
        title: String,
        stake: Decimal,
    },
    /// A missed commitment is waiting for a reason
    RecoveryAvailable { task_id: String },
    /// A stake was refused for lack of funds
    InsufficientFunds { required: Decimal, available: Decimal },
    /// Wallet address acquired
    IdentityBound { address: String },
    /// New commitment staked
    CommitmentCreated {
        task_id: String,
        title: String,
        stake: Decimal,
    },
    /// Commitment completed
    CommitmentCompleted { task_id: String, streak: u32 },
    /// Lead approved and converted into a commitment
    LeadApproved { lead_id: String, task_id: String },
    /// Balance topped up
    Deposited { amount: Decimal, balance: Decimal },
}

impl EngineEvent {
    /// Short human-readable rendering for logs and simple front ends.
    pub fn to_message(&self) -> String {
        match self {
            Self::Reminder { title, deadline, .. } => {
                format!("Reminder: \"{}\" is due at {}", title, deadline.format("%H:%M UTC"))
            }
            Self::DeadlineMissed { title, stake, .. } => {
                format!("Missed \"{}\": {} SOL forfeited", title, stake)
            }
            Self::RecoveryAvailable { .. } => {
                "Tell us what happened and we'll suggest an easier next step".to_string()
            }
            Self::InsufficientFunds { required, available } => format!(
                "Insufficient funds: {} SOL required, {} SOL available",
                required, available
            ),
            Self::IdentityBound { address } => format!("Wallet connected: {}", address),
            Self::CommitmentCreated { title, stake, .. } => {
                format!("Staked {} SOL on \"{}\"", stake, title)
            }
            Self::CommitmentCompleted { streak, .. } => {
                format!("Completed! Streak is now {}", streak)
            }
            Self::LeadApproved { .. } => "Lead approved and added to your commitments".to_string(),
            Self::Deposited { amount, balance } => {
                format!("Deposited {} SOL, balance {} SOL", amount, balance)
            }
        }
    }
}

/// Broadcast fan-out for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; returns how many received it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        trace!(?event, "Publishing engine event");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}
