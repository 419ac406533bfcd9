//! Advisory service boundary.
//!
//! Every advisory operation is a [`StructuredRequest`] (prompt, optional
//! response schema, model tier) sent through a [`StructuredTransport`].
//! [`Advisor`] builds the requests and turns replies into domain values.
//! When a reply is missing or malformed it falls back to a fixed default.
//! Transport failures (after retries) surface as [`AdvisoryError`].
//!
//! ```text
//! engine ──▶ AdvisoryService (Advisor) ──▶ StructuredTransport (Gemini)
//!                 │ parse / fallback            │ retry / backoff
//! ```

mod gemini;
mod prompts;

pub use gemini::GeminiTransport;

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::lead::{Lead, ResponseStatus};
use crate::task::{Commitment, MissReason, SuggestedTask, SourcePlatform};

/// Recommendation used when the adjustment reply is unusable.
pub const FALLBACK_RECOMMENDATION: &str = "Try to break your tasks into smaller chunks.";
/// Coaching text used when the model returns nothing.
pub const FALLBACK_COACHING: &str = "Keep pushing forward!";
/// Analysis used when an inbox scan reply is unusable.
pub const FALLBACK_INBOX_ANALYSIS: &str = "No incoming messages detected from this contact.";

/// Decimal places kept when converting model-provided amounts.
const AMOUNT_SCALE: u32 = 9;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvisoryError {
    #[error("no API key configured for the advisory service")]
    MissingCredentials,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned an error: {0}")]
    Service(String),
}

impl AdvisoryError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingCredentials => false,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) | Self::Service(_) => true,
        }
    }
}

// ============================================================================
// Generic request
// ============================================================================

/// Model choice for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Short structured answers
    Fast,
    /// Long-form reasoning (coaching)
    Deep,
}

/// One structured-advice request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// Operation name, for logs
    pub operation: &'static str,
    pub prompt: String,
    /// When present the reply is constrained to JSON matching this schema
    pub schema: Option<serde_json::Value>,
    pub tier: ModelTier,
    /// Allow the model to ground its answer in web search
    pub grounded: bool,
    /// Reasoning token budget for `Deep` requests
    pub thinking_budget: Option<u32>,
}

impl StructuredRequest {
    pub fn text(operation: &'static str, prompt: String) -> Self {
        Self {
            operation,
            prompt,
            schema: None,
            tier: ModelTier::Fast,
            grounded: false,
            thinking_budget: None,
        }
    }

    pub fn json(operation: &'static str, prompt: String, schema: serde_json::Value) -> Self {
        Self {
            schema: Some(schema),
            ..Self::text(operation, prompt)
        }
    }
}

/// Raw model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    /// Source URIs when the answer was grounded
    pub sources: Vec<String>,
}

/// Transport for [`StructuredRequest`]s.
#[async_trait]
pub trait StructuredTransport: Send + Sync {
    async fn send(&self, request: &StructuredRequest) -> Result<ModelReply, AdvisoryError>;
}

// ============================================================================
// Domain results
// ============================================================================

/// Advice after a missed deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAdjustment {
    pub recommendation: String,
    pub suggested_task: SuggestedTask,
}

impl TaskAdjustment {
    /// Default advice for `task`: same stake, smaller scope.
    pub fn fallback(task: &Commitment) -> Self {
        Self {
            recommendation: FALLBACK_RECOMMENDATION.to_string(),
            suggested_task: SuggestedTask {
                title: format!("{} (Mini)", task.title),
                description: task.description.clone(),
                stake_amount: Some(task.stake_amount),
            },
        }
    }
}

/// Free-text discovery answer plus its sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadDiscovery {
    pub text: String,
    pub sources: Vec<String>,
}

/// Structured lead record extracted from discovery text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadDraft {
    pub name: String,
    pub title: String,
    pub company: String,
    pub email: Option<String>,
    pub contact_info: String,
    pub platform: SourcePlatform,
    pub summary: String,
}

/// Result of scanning the inbox for a lead's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxScan {
    pub status: ResponseStatus,
    pub analysis: String,
}

impl InboxScan {
    pub fn fallback() -> Self {
        Self {
            status: ResponseStatus::NoReply,
            analysis: FALLBACK_INBOX_ANALYSIS.to_string(),
        }
    }
}

/// Inputs for a follow-up draft.
#[derive(Debug, Clone)]
pub struct FollowUpRequest<'a> {
    pub lead_name: &'a str,
    pub company: &'a str,
    pub current_status: ResponseStatus,
    pub last_analysis: &'a str,
    pub platform: SourcePlatform,
    pub template: &'a str,
}

// ============================================================================
// Service trait
// ============================================================================

/// Generative advisory operations used by the engine.
///
/// Implementations return defaults for malformed replies and errors only
/// when the service could not be reached.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn adjust_task(
        &self,
        task: &Commitment,
        reason: MissReason,
    ) -> Result<TaskAdjustment, AdvisoryError>;

    async fn coaching_report(
        &self,
        history: &str,
        missed_count: usize,
    ) -> Result<String, AdvisoryError>;

    async fn discover_leads(
        &self,
        niche: &str,
        location: &str,
        goal: &str,
    ) -> Result<LeadDiscovery, AdvisoryError>;

    async fn structure_leads(&self, raw: &str) -> Result<Vec<LeadDraft>, AdvisoryError>;

    async fn draft_message(&self, lead: &Lead, value_prop: &str) -> Result<String, AdvisoryError>;

    async fn scan_inbox(
        &self,
        lead_name: &str,
        platform: SourcePlatform,
    ) -> Result<InboxScan, AdvisoryError>;

    async fn draft_follow_up(&self, request: &FollowUpRequest<'_>) -> Result<String, AdvisoryError>;
}

// ============================================================================
// Advisor
// ============================================================================

/// [`AdvisoryService`] over any [`StructuredTransport`].
pub struct Advisor<T> {
    transport: T,
}

impl<T: StructuredTransport> Advisor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send a JSON request; `Ok(None)` means the reply did not parse.
    async fn request_json<R: DeserializeOwned>(
        &self,
        request: StructuredRequest,
    ) -> Result<Option<R>, AdvisoryError> {
        let reply = self.transport.send(&request).await?;
        match serde_json::from_str::<R>(extract_json(&reply.text)) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    operation = request.operation,
                    error = %e,
                    "Malformed advisory reply, using default"
                );
                Ok(None)
            }
        }
    }

    async fn request_text(&self, request: StructuredRequest) -> Result<String, AdvisoryError> {
        let reply = self.transport.send(&request).await?;
        debug!(operation = request.operation, chars = reply.text.len(), "Advisory text reply");
        Ok(reply.text.trim().to_string())
    }
}

#[async_trait]
impl<T: StructuredTransport> AdvisoryService for Advisor<T> {
    async fn adjust_task(
        &self,
        task: &Commitment,
        reason: MissReason,
    ) -> Result<TaskAdjustment, AdvisoryError> {
        let request = StructuredRequest::json(
            "adjust_task",
            prompts::adjust_task(task, reason),
            prompts::adjust_task_schema(),
        );
        let wire: Option<AdjustmentWire> = self.request_json(request).await?;
        Ok(wire.map_or_else(|| TaskAdjustment::fallback(task), |w| w.into_adjustment(task)))
    }

    async fn coaching_report(
        &self,
        history: &str,
        missed_count: usize,
    ) -> Result<String, AdvisoryError> {
        let request = StructuredRequest {
            tier: ModelTier::Deep,
            thinking_budget: Some(prompts::COACHING_THINKING_BUDGET),
            ..StructuredRequest::text("coaching_report", prompts::coaching(history, missed_count))
        };
        let text = self.request_text(request).await?;
        Ok(if text.is_empty() {
            FALLBACK_COACHING.to_string()
        } else {
            text
        })
    }

    async fn discover_leads(
        &self,
        niche: &str,
        location: &str,
        goal: &str,
    ) -> Result<LeadDiscovery, AdvisoryError> {
        let request = StructuredRequest {
            grounded: true,
            ..StructuredRequest::text("discover_leads", prompts::discover(niche, location, goal))
        };
        let reply = self.transport.send(&request).await?;
        Ok(LeadDiscovery {
            text: reply.text,
            sources: reply.sources,
        })
    }

    async fn structure_leads(&self, raw: &str) -> Result<Vec<LeadDraft>, AdvisoryError> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let request = StructuredRequest::json(
            "structure_leads",
            prompts::structure_leads(raw),
            prompts::structure_leads_schema(),
        );
        let records: Option<Vec<LeadWire>> = self.request_json(request).await?;
        Ok(records
            .unwrap_or_default()
            .into_iter()
            .filter_map(LeadWire::into_draft)
            .collect())
    }

    async fn draft_message(&self, lead: &Lead, value_prop: &str) -> Result<String, AdvisoryError> {
        self.request_text(StructuredRequest::text(
            "draft_message",
            prompts::draft_message(lead, value_prop),
        ))
        .await
    }

    async fn scan_inbox(
        &self,
        lead_name: &str,
        platform: SourcePlatform,
    ) -> Result<InboxScan, AdvisoryError> {
        let request = StructuredRequest::json(
            "scan_inbox",
            prompts::scan_inbox(lead_name, platform),
            prompts::scan_inbox_schema(),
        );
        let wire: Option<InboxWire> = self.request_json(request).await?;
        Ok(wire.and_then(InboxWire::into_scan).unwrap_or_else(InboxScan::fallback))
    }

    async fn draft_follow_up(&self, request: &FollowUpRequest<'_>) -> Result<String, AdvisoryError> {
        self.request_text(StructuredRequest::text(
            "draft_follow_up",
            prompts::follow_up(request),
        ))
        .await
    }
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Strip Markdown code fences around a JSON payload.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Convert a model-provided number into a ledger amount.
///
/// Non-finite and negative values are treated as absent.
pub fn amount_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(AMOUNT_SCALE).normalize())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustmentWire {
    recommendation: Option<String>,
    suggested_task: Option<SuggestionWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionWire {
    title: Option<String>,
    description: Option<String>,
    stake_amount: Option<f64>,
}

impl AdjustmentWire {
    fn into_adjustment(self, task: &Commitment) -> TaskAdjustment {
        let fallback = TaskAdjustment::fallback(task);
        let recommendation = self
            .recommendation
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(fallback.recommendation);

        let suggested_task = match self.suggested_task {
            Some(s) => SuggestedTask {
                title: s
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(fallback.suggested_task.title),
                description: s.description.unwrap_or(fallback.suggested_task.description),
                stake_amount: s.stake_amount.and_then(amount_from_f64),
            },
            None => fallback.suggested_task,
        };

        TaskAdjustment {
            recommendation,
            suggested_task,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    company: String,
    email: Option<String>,
    #[serde(default)]
    contact_info: String,
    #[serde(default)]
    platform: String,
    #[serde(default)]
    summary: String,
}

impl LeadWire {
    fn into_draft(self) -> Option<LeadDraft> {
        let platform = match self.platform.parse::<SourcePlatform>() {
            Ok(SourcePlatform::Web) | Err(_) => {
                debug!(platform = %self.platform, name = %self.name, "Dropping lead with unsupported platform");
                return None;
            }
            Ok(p) => p,
        };
        if self.name.trim().is_empty() {
            return None;
        }
        Some(LeadDraft {
            name: self.name,
            title: self.title,
            company: self.company,
            email: self.email.filter(|e| !e.trim().is_empty()),
            contact_info: self.contact_info,
            platform,
            summary: self.summary,
        })
    }
}

#[derive(Debug, Deserialize)]
struct InboxWire {
    status: Option<String>,
    analysis: Option<String>,
}

impl InboxWire {
    fn into_scan(self) -> Option<InboxScan> {
        let status = match self.status?.trim().to_ascii_lowercase().as_str() {
            "responded" => ResponseStatus::Responded,
            "no-reply" | "no_reply" | "noreply" => ResponseStatus::NoReply,
            "declined" => ResponseStatus::Declined,
            _ => return None,
        };
        Some(InboxScan {
            status,
            analysis: self.analysis.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Category;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Transport that replays canned replies and records requests.
    struct Scripted {
        replies: Mutex<Vec<Result<ModelReply, AdvisoryError>>>,
        seen: Mutex<Vec<StructuredRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelReply, AdvisoryError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn text(text: &str) -> Self {
            Self::new(vec![Ok(ModelReply {
                text: text.to_string(),
                sources: vec![],
            })])
        }
    }

    #[async_trait]
    impl StructuredTransport for Scripted {
        async fn send(&self, request: &StructuredRequest) -> Result<ModelReply, AdvisoryError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn missed_task() -> Commitment {
        Commitment::new(
            "Post on LinkedIn",
            "Write a thought leadership post",
            Category::Marketing,
            Decimal::new(5, 1),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_adjust_task_parses_reply() {
        let advisor = Advisor::new(Scripted::text(
            r#"```json
{"recommendation": "Block time in the morning.",
 "suggestedTask": {"title": "Draft outline", "description": "Three bullets", "stakeAmount": 0.1}}
```"#,
        ));
        let advice = advisor
            .adjust_task(&missed_task(), MissReason::TooBusy)
            .await
            .unwrap();
        assert_eq!(advice.recommendation, "Block time in the morning.");
        assert_eq!(advice.suggested_task.title, "Draft outline");
        assert_eq!(advice.suggested_task.stake_amount, Some(Decimal::new(1, 1)));

        let seen = advisor.transport.seen.lock().unwrap();
        assert!(seen[0].schema.is_some());
        assert!(seen[0].prompt.contains("Too busy"));
    }

    #[tokio::test]
    async fn test_adjust_task_malformed_uses_fallback() {
        let advisor = Advisor::new(Scripted::text("I think you should rest."));
        let task = missed_task();
        let advice = advisor.adjust_task(&task, MissReason::Forgot).await.unwrap();
        assert_eq!(advice.recommendation, FALLBACK_RECOMMENDATION);
        assert_eq!(advice.suggested_task.title, "Post on LinkedIn (Mini)");
        assert_eq!(advice.suggested_task.stake_amount, Some(task.stake_amount));
    }

    #[tokio::test]
    async fn test_adjust_task_transport_error_propagates() {
        let advisor = Advisor::new(Scripted::new(vec![Err(AdvisoryError::Transport(
            "connection reset".into(),
        ))]));
        assert!(advisor
            .adjust_task(&missed_task(), MissReason::Other)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_structure_leads_drops_unknown_platforms() {
        let advisor = Advisor::new(Scripted::text(
            r#"[
              {"name": "Ada", "title": "CTO", "company": "Acme", "email": null,
               "contactInfo": "linkedin.com/in/ada", "platform": "LinkedIn", "summary": "Hiring"},
              {"name": "Bob", "title": "CEO", "company": "Beta",
               "contactInfo": "myspace.com/bob", "platform": "MySpace", "summary": "?"}
            ]"#,
        ));
        let drafts = advisor.structure_leads("raw text").await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].platform, SourcePlatform::LinkedIn);
        assert_eq!(drafts[0].email, None);
    }

    #[tokio::test]
    async fn test_structure_leads_malformed_is_empty() {
        let advisor = Advisor::new(Scripted::text("{not json"));
        assert!(advisor.structure_leads("raw").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_inbox_unknown_status_falls_back() {
        let advisor = Advisor::new(Scripted::text(r#"{"status": "maybe", "analysis": "?"}"#));
        let scan = advisor.scan_inbox("Ada", SourcePlatform::X).await.unwrap();
        assert_eq!(scan, InboxScan::fallback());
    }

    #[tokio::test]
    async fn test_coaching_empty_reply_uses_default() {
        let advisor = Advisor::new(Scripted::text("   "));
        let report = advisor.coaching_report("Task: x", 2).await.unwrap();
        assert_eq!(report, FALLBACK_COACHING);
        let seen = advisor.transport.seen.lock().unwrap();
        assert_eq!(seen[0].tier, ModelTier::Deep);
        assert!(seen[0].prompt.contains("missed 2"));
    }

    #[test]
    fn test_amount_conversion() {
        assert_eq!(amount_from_f64(0.1), Some(Decimal::new(1, 1)));
        assert_eq!(amount_from_f64(0.123456789123), Some(Decimal::new(123456789, 9)));
        assert_eq!(amount_from_f64(f64::NAN), None);
        assert_eq!(amount_from_f64(-1.0), None);
    }

    #[test]
    fn test_extract_json_handles_fences() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("  [1,2] "), "[1,2]");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(!AdvisoryError::MissingCredentials.is_retryable());
        assert!(!AdvisoryError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(AdvisoryError::Status { status: 503, body: String::new() }.is_retryable());
    }
}
