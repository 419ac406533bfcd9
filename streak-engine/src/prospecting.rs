//! Lead discovery and nurture.
//!
//! Discovery is two advisory calls: a grounded free-text search followed by
//! structuring into records. Structured records land in the lead store as
//! `pending`. Personalization and follow-up draft messages for one lead and
//! write them back; the lead is untouched when the advisory call fails.

use serde::Serialize;
use tracing::{info, warn};

use crate::advisory::{FollowUpRequest, FALLBACK_INBOX_ANALYSIS};
use crate::engine::CommitmentEngine;
use crate::error::{EngineError, Result};
use crate::lead::{Lead, ResponseStatus};

pub const DEFAULT_VALUE_PROP: &str =
    "Helping business owners automate growth with AI-driven systems.";

pub const DEFAULT_FOLLOW_UP_TEMPLATE: &str = "Hi [Name], just checking in regarding \
[Discussion Points]. Any thoughts on how [Company] could benefit from our adspace? Best, [User]";

/// Result of one discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Prospects {
    /// Leads appended to the store by this run
    pub leads: Vec<Lead>,
    /// Grounding URIs returned by the search
    pub sources: Vec<String>,
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{} is required", field)));
    }
    Ok(value)
}

impl CommitmentEngine {
    /// Search for prospects and store them as pending leads.
    ///
    /// Advisory failures degrade to an empty result.
    pub async fn discover_leads(&self, niche: &str, location: &str, goal: &str) -> Result<Prospects> {
        let niche = required("niche", niche)?;
        let location = required("location", location)?;
        let goal = required("goal", goal)?;

        let discovery = match self.advisory.discover_leads(niche, location, goal).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, niche, location, "Lead discovery failed");
                return Ok(Prospects::default());
            }
        };
        if discovery.text.trim().is_empty() {
            return Ok(Prospects {
                leads: Vec::new(),
                sources: discovery.sources,
            });
        }

        let drafts = match self.advisory.structure_leads(&discovery.text).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(error = %e, "Lead structuring failed");
                Vec::new()
            }
        };

        let leads: Vec<Lead> = drafts
            .into_iter()
            .map(|d| {
                let mut lead = Lead::new(d.name, d.title, d.company, d.platform, d.contact_info);
                lead.email = d.email;
                lead.summary = d.summary;
                lead
            })
            .collect();

        self.state.lock().await.leads.extend(leads.iter().cloned());
        info!(count = leads.len(), niche, location, "Leads discovered");

        Ok(Prospects {
            leads,
            sources: discovery.sources,
        })
    }

    /// Draft an outreach message for a stored lead and keep it on the lead.
    pub async fn personalize_lead(&self, lead_id: &str, value_prop: Option<&str>) -> Result<Lead> {
        let lead = self.lead_or_not_found(lead_id).await?;
        let value_prop = value_prop
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VALUE_PROP);

        let message = self.advisory.draft_message(&lead, value_prop).await?;

        let mut state = self.state.lock().await;
        let stored = state.leads.get_mut(lead_id)?;
        stored.personalized_message = message;
        Ok(stored.clone())
    }

    /// Check for a reply from the lead and draft the next follow-up.
    pub async fn run_follow_up(&self, lead_id: &str, template: Option<&str>) -> Result<Lead> {
        let lead = self.lead_or_not_found(lead_id).await?;
        let template = template
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_FOLLOW_UP_TEMPLATE);

        let scan = self.advisory.scan_inbox(&lead.name, lead.platform).await?;
        let analysis = if scan.analysis.trim().is_empty() {
            FALLBACK_INBOX_ANALYSIS
        } else {
            scan.analysis.as_str()
        };
        let request = FollowUpRequest {
            lead_name: &lead.name,
            company: &lead.company,
            current_status: scan.status,
            last_analysis: analysis,
            platform: lead.platform,
            template,
        };
        let message = self.advisory.draft_follow_up(&request).await?;

        let mut state = self.state.lock().await;
        let stored = state.leads.get_mut(lead_id)?;
        stored.last_response_status = Some(scan.status);
        stored.follow_up_count += 1;
        stored.personalized_message = message;
        info!(
            lead_id,
            status = ?scan.status,
            follow_ups = stored.follow_up_count,
            "Follow-up drafted"
        );
        Ok(stored.clone())
    }

    /// Leads that replied at their last follow-up.
    pub async fn responsive_leads(&self) -> Vec<Lead> {
        self.state
            .lock()
            .await
            .leads
            .all()
            .iter()
            .filter(|l| l.last_response_status == Some(ResponseStatus::Responded))
            .cloned()
            .collect()
    }

    async fn lead_or_not_found(&self, lead_id: &str) -> Result<Lead> {
        self.lead(lead_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("lead {}", lead_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{InboxScan, LeadDraft};
    use crate::lead::LeadStatus;
    use crate::task::SourcePlatform;
    use crate::testing::{engine_with, StubAdvisor};
    use rust_decimal::Decimal;

    fn draft(name: &str) -> LeadDraft {
        LeadDraft {
            name: name.into(),
            title: "Founder".into(),
            company: format!("{} Co", name),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            contact_info: format!("x.com/{}", name.to_lowercase()),
            platform: SourcePlatform::X,
            summary: "Posts about growth".into(),
        }
    }

    fn prospecting_advisor() -> StubAdvisor {
        StubAdvisor {
            discovery_text: "Two founders in Austin".into(),
            leads: vec![draft("Grace"), draft("Linus")],
            message: "Hello".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_discover_appends_pending_leads() {
        let engine = engine_with(Decimal::ONE, prospecting_advisor());
        let found = engine.discover_leads("SaaS", "Austin", "demos").await.unwrap();

        assert_eq!(found.leads.len(), 2);
        assert_eq!(found.sources, vec!["https://example.com/source".to_string()]);
        let stored = engine.leads().await;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|l| l.status == LeadStatus::Pending));
        assert!(stored.iter().all(|l| l.personalized_message.is_empty()));
        assert!(stored.iter().all(|l| l.follow_up_count == 0));
        assert_eq!(stored[0].email.as_deref(), Some("grace@example.com"));
    }

    #[tokio::test]
    async fn test_discover_rejects_blank_inputs() {
        let engine = engine_with(Decimal::ONE, prospecting_advisor());
        assert!(matches!(
            engine.discover_leads("SaaS", "  ", "demos").await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(engine.leads().await.is_empty());
    }

    #[tokio::test]
    async fn test_discover_failure_is_empty() {
        let advisor = StubAdvisor {
            fail: true,
            ..prospecting_advisor()
        };
        let engine = engine_with(Decimal::ONE, advisor);
        let found = engine.discover_leads("SaaS", "Austin", "demos").await.unwrap();
        assert!(found.leads.is_empty());
        assert!(engine.leads().await.is_empty());
    }

    #[tokio::test]
    async fn test_personalize_stores_message_with_default_value_prop() {
        let engine = engine_with(Decimal::ONE, prospecting_advisor());
        let found = engine.discover_leads("SaaS", "Austin", "demos").await.unwrap();
        let id = found.leads[0].id.clone();

        let lead = engine.personalize_lead(&id, None).await.unwrap();
        assert_eq!(lead.personalized_message, "Hello for Grace");
        assert_eq!(engine.lead(&id).await.unwrap().personalized_message, "Hello for Grace");

        assert!(matches!(
            engine.personalize_lead("missing", None).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_follow_up_records_status_and_count() {
        let advisor = StubAdvisor {
            inbox: Some(InboxScan {
                status: ResponseStatus::Responded,
                analysis: "Asked for pricing".into(),
            }),
            ..prospecting_advisor()
        };
        let engine = engine_with(Decimal::ONE, advisor);
        let found = engine.discover_leads("SaaS", "Austin", "demos").await.unwrap();
        let id = found.leads[1].id.clone();

        let lead = engine.run_follow_up(&id, None).await.unwrap();
        assert_eq!(lead.follow_up_count, 1);
        assert_eq!(lead.last_response_status, Some(ResponseStatus::Responded));
        assert_eq!(lead.personalized_message, "Following up, Linus");

        engine.run_follow_up(&id, Some("Hi [Name]")).await.unwrap();
        assert_eq!(engine.lead(&id).await.unwrap().follow_up_count, 2);
        assert_eq!(engine.responsive_leads().await.len(), 1);
    }
}
