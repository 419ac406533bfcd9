//! Deadline monitor.
//!
//! A periodic pass over active commitments with deadlines. Per commitment the
//! reminder check runs before the miss check:
//!
//! - reminder: policy set, not yet sent, and `now` in `[deadline - offset, deadline)`
//! - miss: `now > deadline`; status becomes `missed`, the stake is forfeited
//!   and the commitment is offered to the recovery workflow
//!
//! This is the only place a commitment becomes `missed`. Each tick locks the
//! engine state and evaluates the current store, never a cached snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::{CommitmentEngine, EngineState};
use crate::notification::EngineEvent;
use crate::task::TaskStatus;

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Commitments whose reminder fired
    pub reminders: Vec<String>,
    /// Commitments transitioned to missed
    pub missed: Vec<String>,
    /// Commitment placed in the recovery slot, if any
    pub recovery_offered: Option<String>,
}

impl PassReport {
    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty() && self.missed.is_empty()
    }
}

/// Evaluate every active commitment at `now`.
pub(crate) fn evaluate(state: &mut EngineState, now: DateTime<Utc>) -> (PassReport, Vec<EngineEvent>) {
    let mut report = PassReport::default();
    let mut events = Vec::new();
    let mut forfeits = Vec::new();

    for task in state.tasks.iter_mut() {
        if task.status != TaskStatus::Active {
            continue;
        }
        let Some(deadline) = task.deadline else {
            continue;
        };

        if let Some(offset) = task.reminder.offset() {
            if !task.reminder_sent && now >= deadline - offset && now < deadline {
                task.reminder_sent = true;
                report.reminders.push(task.id.clone());
                events.push(EngineEvent::Reminder {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    deadline,
                });
            }
        }

        if now > deadline {
            task.status = TaskStatus::Missed;
            report.missed.push(task.id.clone());
            forfeits.push((task.id.clone(), task.stake_amount));
            events.push(EngineEvent::DeadlineMissed {
                task_id: task.id.clone(),
                title: task.title.clone(),
                stake: task.stake_amount,
            });
        }
    }

    for (task_id, stake) in &forfeits {
        state.ledger.record_forfeit(*stake, task_id);
        state.tasks.record_missed(task_id, *stake, now);
    }

    // Single slot: the last miss detected in this pass is offered
    if let Some(task_id) = report.missed.last() {
        if state.recovery.offer(task_id) {
            report.recovery_offered = Some(task_id.clone());
            events.push(EngineEvent::RecoveryAvailable {
                task_id: task_id.clone(),
            });
        } else {
            debug!(task_id = %task_id, "Recovery slot busy, commitment left missed");
        }
    }

    (report, events)
}

impl CommitmentEngine {
    /// Run one monitor pass at `now` and publish its notifications.
    pub async fn evaluate_deadlines_at(&self, now: DateTime<Utc>) -> PassReport {
        let (report, events) = {
            let mut state = self.state.lock().await;
            evaluate(&mut state, now)
        };
        for task_id in &report.missed {
            warn!(task_id = %task_id, "Deadline missed, stake forfeited");
        }
        self.events.publish_all(events);
        report
    }

    pub async fn evaluate_deadlines(&self) -> PassReport {
        self.evaluate_deadlines_at(Utc::now()).await
    }
}

/// Periodic driver for deadline evaluation.
pub struct DeadlineMonitor;

impl DeadlineMonitor {
    /// Spawn the monitor on the current runtime. The first pass runs immediately.
    pub fn spawn(engine: Arc<CommitmentEngine>, period: Duration) -> MonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "Deadline monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = engine.evaluate_deadlines().await;
                        if !report.is_empty() {
                            debug!(
                                reminders = report.reminders.len(),
                                missed = report.missed.len(),
                                "Monitor pass"
                            );
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Deadline monitor stopped");
        });
        MonitorHandle { stop_tx, join }
    }
}

/// Handle to a running [`DeadlineMonitor`].
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Signal the monitor to stop and wait for the current pass to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Deadline monitor task ended abnormally");
        }
    }
}
