//! Coaching report over the current commitment history.

use tracing::{debug, warn};

use crate::advisory::FALLBACK_COACHING;
use crate::engine::CommitmentEngine;
use crate::task::{Commitment, TaskStatus};

/// One-line history: `"<title>: <streak> day streak"` per commitment.
pub fn history_summary(tasks: &[Commitment]) -> String {
    tasks
        .iter()
        .map(|t| format!("{}: {} day streak", t.title, t.streak))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CommitmentEngine {
    /// Ask the advisory service for a short performance review.
    ///
    /// Never fails; an unreachable service yields the default message.
    pub async fn coaching_report(&self) -> String {
        let (history, missed) = {
            let state = self.state.lock().await;
            let tasks = state.tasks.all();
            let missed = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Missed)
                .count();
            (history_summary(tasks), missed)
        };

        debug!(missed, "Requesting coaching report");
        match self.advisory.coaching_report(&history, missed).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Coaching report unavailable, using default");
                FALLBACK_COACHING.to_string()
            }
        }
    }
}
