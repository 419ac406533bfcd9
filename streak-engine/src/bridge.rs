//! Lead-to-commitment conversion.
//!
//! Approving a lead stakes a fixed amount on reaching out to it. The lead is
//! stored as approved only when the stake succeeds.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::engine::CommitmentEngine;
use crate::error::{EngineError, Result};
use crate::lead::{Lead, LeadStatus};
use crate::notification::EngineEvent;
use crate::task::{Category, Commitment, ReminderPolicy, TaskStatus};

/// Build the outreach commitment for `lead`.
pub fn lead_commitment(
    lead: &Lead,
    stake: Decimal,
    now: DateTime<Utc>,
    deadline_in: Duration,
) -> Commitment {
    let message = Some(lead.personalized_message.clone()).filter(|m| !m.trim().is_empty());
    let mut commitment = Commitment::new(
        format!("Outreach: {}", lead.name),
        format!("Send approved message to {} at {}", lead.name, lead.company),
        Category::Leads,
        stake,
        now,
    )
    .with_deadline(now + deadline_in, ReminderPolicy::OneHour)
    .with_outreach(lead.platform, lead.contact_info.clone(), message);
    commitment.lead_id = Some(lead.id.clone());
    commitment
}

impl CommitmentEngine {
    /// Approve `lead` and stake on contacting it.
    ///
    /// On any failure neither the lead store nor the ledger changes.
    pub async fn convert_lead(&self, lead: Lead) -> Result<Commitment> {
        self.validator.ensure_identity().await?;

        let created = {
            let mut state = self.state.lock().await;
            if state.tasks.has_active_for_lead(&lead.id) {
                return Err(EngineError::InvalidTransition(format!(
                    "lead {} already has an active commitment",
                    lead.id
                )));
            }

            let commitment = lead_commitment(
                &lead,
                self.settings.lead_stake,
                Utc::now(),
                self.settings.default_deadline,
            );
            let created = state.stake(&self.validator, commitment)?;

            let mut approved = lead;
            approved.status = LeadStatus::Approved;
            state.leads.upsert(approved);
            created
        };

        info!(task_id = %created.id, lead_id = ?created.lead_id, "Lead converted into commitment");
        if let Some(lead_id) = &created.lead_id {
            self.events.publish(EngineEvent::LeadApproved {
                lead_id: lead_id.clone(),
                task_id: created.id.clone(),
            });
        }
        self.events.publish(EngineEvent::CommitmentCreated {
            task_id: created.id.clone(),
            title: created.title.clone(),
            stake: created.stake_amount,
        });
        Ok(created)
    }

    /// Leads whose outreach commitment has been completed.
    pub async fn follow_up_candidates(&self) -> Vec<Lead> {
        let state = self.state.lock().await;
        state
            .leads
            .all()
            .iter()
            .filter(|lead| {
                lead.status == LeadStatus::Completed
                    || state.tasks.all().iter().any(|t| {
                        t.lead_id.as_deref() == Some(lead.id.as_str())
                            && t.status == TaskStatus::Completed
                    })
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SourcePlatform;
    use crate::testing::{engine_with, StubAdvisor};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("Ada", "CTO", "Acme", SourcePlatform::LinkedIn, "linkedin.com/in/ada");
        lead.personalized_message = "Hi Ada".into();
        lead
    }

    #[test]
    fn test_lead_commitment_shape() {
        let now = Utc::now();
        let lead = lead();
        let c = lead_commitment(&lead, dec("0.2"), now, Duration::hours(24));
        assert_eq!(c.title, "Outreach: Ada");
        assert_eq!(c.description, "Send approved message to Ada at Acme");
        assert_eq!(c.category, Category::Leads);
        assert_eq!(c.deadline, Some(now + Duration::hours(24)));
        assert_eq!(c.reminder, ReminderPolicy::OneHour);
        assert_eq!(c.contact_details.as_deref(), Some("linkedin.com/in/ada"));
        assert_eq!(c.outreach_message.as_deref(), Some("Hi Ada"));
        assert_eq!(c.source_platform, Some(SourcePlatform::LinkedIn));
        assert_eq!(c.lead_id.as_deref(), Some(lead.id.as_str()));
    }

    #[tokio::test]
    async fn test_convert_lead_stakes_and_approves() {
        let engine = engine_with(dec("1"), StubAdvisor::default());
        let lead = lead();
        let lead_id = lead.id.clone();

        let task = engine.convert_lead(lead).await.unwrap();
        assert_eq!(task.stake_amount, dec("0.20"));
        assert_eq!(engine.balance().await, dec("0.80"));
        assert_eq!(
            engine.lead(&lead_id).await.unwrap().status,
            LeadStatus::Approved
        );
        assert_eq!(engine.dashboard().await.active_lead_commitments, 1);

        // A second approval while the first is active is refused
        let again = engine.lead(&lead_id).await.unwrap();
        assert!(matches!(
            engine.convert_lead(again).await,
            Err(EngineError::InvalidTransition(_))
        ));
        assert_eq!(engine.balance().await, dec("0.80"));
    }

    #[tokio::test]
    async fn test_failed_validation_leaves_lead_and_ledger() {
        let engine = engine_with(dec("0.1"), StubAdvisor::default());
        let lead = lead();
        let lead_id = lead.id.clone();

        assert!(engine.convert_lead(lead).await.unwrap_err().needs_top_up());
        assert!(engine.lead(&lead_id).await.is_none());
        assert!(engine.tasks().await.is_empty());
        assert_eq!(engine.balance().await, dec("0.1"));
    }

    #[tokio::test]
    async fn test_completed_outreach_becomes_follow_up_candidate() {
        let engine = engine_with(dec("1"), StubAdvisor::default());
        let task = engine.convert_lead(lead()).await.unwrap();
        assert!(engine.follow_up_candidates().await.is_empty());

        let done = engine.complete(&task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        let candidates = engine.follow_up_candidates().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].status, LeadStatus::Sent);
    }
}
