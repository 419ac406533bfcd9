//! Recovery workflow after a missed deadline.
//!
//! One commitment at a time occupies the recovery slot:
//!
//! ```text
//! Idle ─offer─▶ AwaitingReason ─submit_reason─▶ AwaitingAdvice ─advice─▶ Advised
//!   ▲                 ▲                              │                     │
//!   │                 └──────── advisory error ──────┘                     │
//!   └──────────────── close (any state) / accept (Advised) ────────────────┘
//! ```
//!
//! Each advisory call carries a ticket. Closing or re-submitting issues a
//! new ticket, so a late result for an abandoned call is discarded.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::advisory::TaskAdjustment;
use crate::engine::CommitmentEngine;
use crate::error::{EngineError, Result};
use crate::notification::EngineEvent;
use crate::task::{Category, Commitment, MissReason, ReminderPolicy, TaskStatus};

/// Public phase of the recovery slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    AwaitingReason,
    AwaitingAdvice,
    Advised,
}

/// Snapshot of the recovery slot for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryView {
    pub task: Commitment,
    pub phase: RecoveryPhase,
    pub reason: Option<MissReason>,
    pub advice: Option<TaskAdjustment>,
}

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Idle,
    AwaitingReason {
        task_id: String,
    },
    AwaitingAdvice {
        task_id: String,
        reason: MissReason,
        ticket: u64,
    },
    Advised {
        task_id: String,
        reason: MissReason,
        advice: TaskAdjustment,
        ticket: u64,
    },
}

/// Single-slot recovery state machine.
#[derive(Debug, Default)]
pub(crate) struct RecoveryWorkflow {
    slot: Slot,
    next_ticket: u64,
}

impl RecoveryWorkflow {
    pub(crate) fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Idle)
    }

    pub(crate) fn task_id(&self) -> Option<&str> {
        match &self.slot {
            Slot::Idle => None,
            Slot::AwaitingReason { task_id }
            | Slot::AwaitingAdvice { task_id, .. }
            | Slot::Advised { task_id, .. } => Some(task_id),
        }
    }

    /// Put `task_id` in the slot unless a reason was already submitted.
    pub(crate) fn offer(&mut self, task_id: &str) -> bool {
        match self.slot {
            Slot::Idle | Slot::AwaitingReason { .. } => {
                self.slot = Slot::AwaitingReason {
                    task_id: task_id.to_string(),
                };
                true
            }
            _ => false,
        }
    }

    /// Record the reason and issue a ticket for the advisory call.
    ///
    /// Re-submitting while a call is pending supersedes it.
    pub(crate) fn begin_advice(&mut self, reason: MissReason) -> Result<(String, u64)> {
        let task_id = match &self.slot {
            Slot::AwaitingReason { task_id } | Slot::AwaitingAdvice { task_id, .. } => {
                task_id.clone()
            }
            Slot::Idle => {
                return Err(EngineError::InvalidTransition(
                    "no missed commitment awaiting recovery".into(),
                ))
            }
            Slot::Advised { .. } => {
                return Err(EngineError::InvalidTransition(
                    "advice already received; accept or close the recovery".into(),
                ))
            }
        };
        let ticket = self.issue_ticket();
        self.slot = Slot::AwaitingAdvice {
            task_id: task_id.clone(),
            reason,
            ticket,
        };
        Ok((task_id, ticket))
    }

    /// Store advice for `ticket`; fails if the call was abandoned.
    pub(crate) fn finish_advice(&mut self, ticket: u64, advice: TaskAdjustment) -> Result<String> {
        match &self.slot {
            Slot::AwaitingAdvice {
                task_id,
                reason,
                ticket: current,
            } if *current == ticket => {
                let task_id = task_id.clone();
                self.slot = Slot::Advised {
                    task_id: task_id.clone(),
                    reason: *reason,
                    advice,
                    ticket,
                };
                Ok(task_id)
            }
            _ => Err(EngineError::RecoveryCancelled),
        }
    }

    /// Return to `AwaitingReason` after a failed call for `ticket`.
    pub(crate) fn abort_advice(&mut self, ticket: u64) -> bool {
        match &self.slot {
            Slot::AwaitingAdvice {
                task_id,
                ticket: current,
                ..
            } if *current == ticket => {
                self.slot = Slot::AwaitingReason {
                    task_id: task_id.clone(),
                };
                true
            }
            _ => false,
        }
    }

    pub(crate) fn advised(&self) -> Option<(&str, &TaskAdjustment, u64)> {
        match &self.slot {
            Slot::Advised {
                task_id,
                advice,
                ticket,
                ..
            } => Some((task_id, advice, *ticket)),
            _ => None,
        }
    }

    pub(crate) fn close(&mut self) -> Option<String> {
        // Invalidate any outstanding ticket
        self.next_ticket += 1;
        let task_id = self.task_id().map(String::from);
        self.slot = Slot::Idle;
        task_id
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn view_parts(&self) -> Option<(RecoveryPhase, Option<MissReason>, Option<TaskAdjustment>)> {
        match &self.slot {
            Slot::Idle => None,
            Slot::AwaitingReason { .. } => Some((RecoveryPhase::AwaitingReason, None, None)),
            Slot::AwaitingAdvice { reason, .. } => {
                Some((RecoveryPhase::AwaitingAdvice, Some(*reason), None))
            }
            Slot::Advised { reason, advice, .. } => Some((
                RecoveryPhase::Advised,
                Some(*reason),
                Some(advice.clone()),
            )),
        }
    }
}

// ============================================================================
// Engine operations
// ============================================================================

impl CommitmentEngine {
    /// Current recovery slot, if occupied.
    pub async fn recovery(&self) -> Option<RecoveryView> {
        let state = self.state.lock().await;
        let (phase, reason, advice) = state.recovery.view_parts()?;
        let task = state.tasks.get(state.recovery.task_id()?)?.clone();
        Some(RecoveryView {
            task,
            phase,
            reason,
            advice,
        })
    }

    /// Start recovery for an older missed commitment.
    ///
    /// Only allowed while no reason has been submitted for another one.
    pub async fn open_recovery(&self, task_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let status = state
            .tasks
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| EngineError::NotFound(format!("commitment {}", task_id)))?;
        if status != TaskStatus::Missed {
            return Err(EngineError::InvalidTransition(format!(
                "commitment {} is {}, only missed commitments can be recovered",
                task_id,
                status.as_str()
            )));
        }
        if !state.recovery.offer(task_id) {
            return Err(EngineError::InvalidTransition(
                "another recovery is in progress".into(),
            ));
        }
        drop(state);
        self.events.publish(EngineEvent::RecoveryAvailable {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    /// Submit the miss reason and fetch advice.
    ///
    /// On advisory failure the slot returns to awaiting a reason. If the
    /// workflow is closed while the call is pending, the result is dropped
    /// and [`EngineError::RecoveryCancelled`] is returned.
    pub async fn submit_reason(&self, reason: MissReason) -> Result<TaskAdjustment> {
        let (task, ticket) = {
            let mut state = self.state.lock().await;
            let (task_id, ticket) = state.recovery.begin_advice(reason)?;
            let task = state
                .tasks
                .get(&task_id)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("commitment {}", task_id)))?;
            (task, ticket)
        };
        info!(task_id = %task.id, reason = %reason, "Requesting recovery advice");

        let result = self.advisory.adjust_task(&task, reason).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(advice) => {
                let task_id = state.recovery.finish_advice(ticket, advice.clone())?;
                if let Some(original) = state.tasks.get_mut(&task_id) {
                    original.missed_reason = Some(reason);
                    original.ai_recommendation = Some(advice.recommendation.clone());
                    original.suggested_replacement = Some(advice.suggested_task.clone());
                }
                Ok(advice)
            }
            Err(e) => {
                if !state.recovery.abort_advice(ticket) {
                    return Err(EngineError::RecoveryCancelled);
                }
                warn!(task_id = %task.id, error = %e, "Recovery advice failed");
                Err(e.into())
            }
        }
    }

    /// Accept the advised replacement as a new commitment.
    ///
    /// The original missed commitment keeps its stake and status. On
    /// insufficient funds the advice stays available for a retry after a
    /// top-up.
    pub async fn accept_recovery(&self) -> Result<Commitment> {
        let ticket = {
            let state = self.state.lock().await;
            let (_, _, ticket) = state.recovery.advised().ok_or_else(|| {
                EngineError::InvalidTransition("no recovery advice to accept".into())
            })?;
            ticket
        };

        self.validator.ensure_identity().await?;

        let created = {
            let mut state = self.state.lock().await;
            let (task_id, advice) = match state.recovery.advised() {
                Some((task_id, advice, current)) if current == ticket => {
                    (task_id.to_string(), advice.clone())
                }
                _ => return Err(EngineError::RecoveryCancelled),
            };
            let category = state
                .tasks
                .get(&task_id)
                .map_or(Category::Leads, |t| t.category);
            let stake = advice
                .suggested_task
                .stake_amount
                .filter(|s| *s > Decimal::ZERO)
                .unwrap_or(self.settings.recovery_fallback_stake);

            let now = Utc::now();
            let replacement = Commitment::new(
                advice.suggested_task.title,
                advice.suggested_task.description,
                category,
                stake,
                now,
            )
            .with_deadline(now + self.settings.default_deadline, ReminderPolicy::OneHour);

            let created = state.stake(&self.validator, replacement)?;
            state.recovery.close();
            created
        };

        info!(task_id = %created.id, stake = %created.stake_amount, "Recovery commitment created");
        self.events.publish(EngineEvent::CommitmentCreated {
            task_id: created.id.clone(),
            title: created.title.clone(),
            stake: created.stake_amount,
        });
        Ok(created)
    }

    /// Decline or abandon the recovery. Any pending advice is discarded.
    pub async fn close_recovery(&self) -> Option<String> {
        let closed = self.state.lock().await.recovery.close();
        if let Some(task_id) = &closed {
            info!(task_id = %task_id, "Recovery closed");
        }
        closed
    }
}
