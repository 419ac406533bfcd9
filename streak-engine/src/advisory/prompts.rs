//! Prompt and response-schema builders.

use serde_json::{json, Value};

use super::FollowUpRequest;
use crate::lead::{Lead, ResponseStatus};
use crate::task::{Commitment, MissReason, SourcePlatform};

/// Reasoning budget for coaching reports.
pub(super) const COACHING_THINKING_BUDGET: u32 = 32_768;

pub(super) fn adjust_task(task: &Commitment, reason: MissReason) -> String {
    format!(
        r#"The user missed a commitment: "{title}" ({description}).
Reason given: "{reason}".
They forfeited a stake of {stake} SOL.

Work out why this likely happened and respond in JSON with:
1. "recommendation": a short, empathetic but firm strategy for next time.
2. "suggestedTask": a smaller or adjusted replacement commitment (title, description, stakeAmount) that fits the reason."#,
        title = task.title,
        description = task.description,
        reason = reason.label(),
        stake = task.stake_amount,
    )
}

pub(super) fn adjust_task_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "recommendation": { "type": "STRING" },
            "suggestedTask": {
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING" },
                    "description": { "type": "STRING" },
                    "stakeAmount": { "type": "NUMBER" }
                },
                "required": ["title", "description", "stakeAmount"]
            }
        },
        "required": ["recommendation", "suggestedTask"]
    })
}

pub(super) fn coaching(history: &str, missed_count: usize) -> String {
    format!(
        "Review my recent productivity. I have missed {missed_count} deadlines recently. \
         My commitment history: {history}. \
         Give me in-depth strategic advice on fixing my lead generation pipeline and staying consistent."
    )
}

pub(super) fn discover(niche: &str, location: &str, goal: &str) -> String {
    format!(
        "Find 5 potential business leads (people) in the {niche} industry located in {location}.\n\
         The outreach goal is: {goal}.\n\
         Look across LinkedIn, X (Twitter) and Facebook for founders, directors or other decision makers \
         who would care about that goal. Use web search to find real profiles and recent posts.\n\
         For each person give name, role, company, profile URL or handle, which platform the profile is on, \
         and recent interests or news that connect them to: {goal}."
    )
}

pub(super) fn structure_leads(raw: &str) -> String {
    format!(
        "Convert the lead information below into a JSON array. Each object needs 'name', 'title', \
         'company', 'email' (null when unknown), 'contactInfo' (profile URL or handle), 'platform' \
         ('LinkedIn', 'X' or 'Facebook') and a 'summary' of why they are a good lead.\n\
         Input: {raw}"
    )
}

pub(super) fn structure_leads_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING" },
                "title": { "type": "STRING" },
                "company": { "type": "STRING" },
                "email": { "type": "STRING", "nullable": true },
                "contactInfo": { "type": "STRING" },
                "platform": { "type": "STRING", "description": "One of 'LinkedIn', 'X', 'Facebook'" },
                "summary": { "type": "STRING" }
            },
            "required": ["name", "title", "company", "contactInfo", "platform", "summary"]
        }
    })
}

pub(super) fn draft_message(lead: &Lead, value_prop: &str) -> String {
    format!(
        "Write a professional, high-converting introductory {platform} message to {name} from {company}.\n\
         What we know about them: {summary}.\n\
         My value proposition: {value_prop}.\n\
         Match the platform's register (short and punchy for X, more formal for LinkedIn). Under 100 words.",
        platform = lead.platform,
        name = lead.name,
        company = lead.company,
        summary = lead.summary,
    )
}

pub(super) fn scan_inbox(lead_name: &str, platform: SourcePlatform) -> String {
    format!(
        "Act as an agent checking the user's inbox. A message was sent to {lead_name} on {platform}.\n\
         Decide whether they replied favourably, did not reply, or declined.\n\
         Return a JSON object with 'status' (one of 'responded', 'no-reply', 'declined') and \
         'analysis' (a brief note on what was found)."
    )
}

pub(super) fn scan_inbox_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "status": { "type": "STRING" },
            "analysis": { "type": "STRING" }
        },
        "required": ["status", "analysis"]
    })
}

pub(super) fn follow_up(request: &FollowUpRequest<'_>) -> String {
    let status = match request.current_status {
        ResponseStatus::Responded => "responded",
        ResponseStatus::NoReply => "no-reply",
        ResponseStatus::Declined => "declined",
        ResponseStatus::Pending => "pending",
    };
    format!(
        "Write a follow-up message for {name} at {company}.\n\
         Current situation: {status}.\n\
         Notes on the last interaction: {analysis}.\n\
         Platform: {platform}.\n\
         Style template: {template}.\n\
         If they did not reply, stay gentle and add value. If they replied, acknowledge what they said. \
         Use the template as a style guide but keep it natural for {platform}. Under 70 words.",
        name = request.lead_name,
        company = request.company,
        analysis = request.last_analysis,
        platform = request.platform,
        template = request.template,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Category;
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[test]
    fn test_adjust_prompt_mentions_task_and_stake() {
        let task = Commitment::new("Call Ada", "intro call", Category::Leads, Decimal::new(2, 1), Utc::now());
        let prompt = adjust_task(&task, MissReason::UnderestimatedDifficulty);
        assert!(prompt.contains("\"Call Ada\" (intro call)"));
        assert!(prompt.contains("Underestimated difficulty"));
        assert!(prompt.contains("0.2 SOL"));
    }

    #[test]
    fn test_schemas_require_fields() {
        assert_eq!(adjust_task_schema()["required"][1], "suggestedTask");
        assert_eq!(structure_leads_schema()["type"], "ARRAY");
        assert_eq!(scan_inbox_schema()["properties"]["status"]["type"], "STRING");
    }
}
