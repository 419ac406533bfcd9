//! Staked commitments.
//!
//! A [`Commitment`] is the unit of accountability: a titled task backed by
//! a stake, an optional deadline and a reminder policy. Lifecycle:
//!
//! ```text
//! active ──complete──▶ completed
//!   │
//!   └──deadline passed──▶ missed
//! ```
//!
//! `broken` exists in the persisted shape but no operation produces it.

mod store;

pub use store::{
    AccountabilityAction, AccountabilityEntry, Completion, DayActivity, TaskQuery, TaskSort, TaskStore,
};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

// ============================================================================
// Enumerations
// ============================================================================

/// Commitment category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Leads,
    Marketing,
    Product,
    Health,
}

impl Category {
    pub const ALL: [Category; 4] = [Self::Leads, Self::Marketing, Self::Product, Self::Health];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Leads => "Leads",
            Self::Marketing => "Marketing",
            Self::Product => "Product",
            Self::Health => "Health",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown category '{}'", s)))
    }
}

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Completed,
    Missed,
    Broken,
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Missed => "missed",
            Self::Broken => "broken",
        }
    }
}

/// How long before the deadline a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReminderPolicy {
    #[default]
    None,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl ReminderPolicy {
    /// Offset before the deadline, or `None` when reminders are off.
    pub fn offset(&self) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::FifteenMinutes => Some(Duration::minutes(15)),
            Self::OneHour => Some(Duration::hours(1)),
            Self::OneDay => Some(Duration::days(1)),
        }
    }
}

/// Platform a lead-derived commitment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourcePlatform {
    LinkedIn,
    X,
    Facebook,
    Web,
}

impl SourcePlatform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedIn => "LinkedIn",
            Self::X => "X",
            Self::Facebook => "Facebook",
            Self::Web => "Web",
        }
    }
}

impl fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourcePlatform {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Self::LinkedIn),
            "x" | "twitter" => Ok(Self::X),
            "facebook" => Ok(Self::Facebook),
            "web" => Ok(Self::Web),
            other => Err(EngineError::InvalidInput(format!(
                "unknown platform '{}'",
                other
            ))),
        }
    }
}

/// Reason a user gives for missing a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissReason {
    #[serde(rename = "Too busy")]
    TooBusy,
    #[serde(rename = "Forgot")]
    Forgot,
    #[serde(rename = "Technical issues")]
    TechnicalIssues,
    #[serde(rename = "Lack of motivation")]
    LackOfMotivation,
    #[serde(rename = "Underestimated difficulty")]
    UnderestimatedDifficulty,
    #[serde(rename = "Other")]
    Other,
}

impl MissReason {
    pub const ALL: [MissReason; 6] = [
        Self::TooBusy,
        Self::Forgot,
        Self::TechnicalIssues,
        Self::LackOfMotivation,
        Self::UnderestimatedDifficulty,
        Self::Other,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            Self::TooBusy => "Too busy",
            Self::Forgot => "Forgot",
            Self::TechnicalIssues => "Technical issues",
            Self::LackOfMotivation => "Lack of motivation",
            Self::UnderestimatedDifficulty => "Underestimated difficulty",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MissReason {
    type Err = EngineError;

    /// Accepts labels ("Too busy") as well as slug forms ("too-busy", "too_busy").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        Self::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown miss reason '{}'", s)))
    }
}

// ============================================================================
// Commitment
// ============================================================================

/// Replacement proposed by the advisory service after a miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedTask {
    pub title: String,
    pub description: String,
    /// Absent or zero means "use the configured fallback stake"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_amount: Option<Decimal>,
}

/// A staked task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub streak: u32,
    pub last_completed: Option<NaiveDate>,
    pub stake_amount: Decimal,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub reminder: ReminderPolicy,
    pub reminder_sent: bool,

    // Outreach fields (lead-derived or manual outreach)
    pub contact_details: Option<String>,
    pub outreach_message: Option<String>,
    pub source_platform: Option<SourcePlatform>,
    pub lead_id: Option<String>,

    // Recovery fields, written only after a miss
    pub missed_reason: Option<MissReason>,
    pub ai_recommendation: Option<String>,
    pub suggested_replacement: Option<SuggestedTask>,
}

impl Commitment {
    /// Create an active commitment with no deadline.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: Category,
        stake_amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            category,
            streak: 0,
            last_completed: None,
            stake_amount,
            status: TaskStatus::Active,
            created_at,
            deadline: None,
            reminder: ReminderPolicy::None,
            reminder_sent: false,
            contact_details: None,
            outreach_message: None,
            source_platform: None,
            lead_id: None,
            missed_reason: None,
            ai_recommendation: None,
            suggested_replacement: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>, reminder: ReminderPolicy) -> Self {
        self.deadline = Some(deadline);
        self.reminder = reminder;
        self
    }

    pub fn with_outreach(
        mut self,
        platform: SourcePlatform,
        contact_details: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        self.source_platform = Some(platform);
        self.contact_details = Some(contact_details.into());
        self.outreach_message = message;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    pub fn is_lead_derived(&self) -> bool {
        self.lead_id.is_some()
    }

    /// Start of the reminder window, if a reminder applies.
    pub fn reminder_due_at(&self) -> Option<DateTime<Utc>> {
        let deadline = self.deadline?;
        self.reminder.offset().map(|offset| deadline - offset)
    }
}

/// User-supplied fields for a manual outreach commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCommitment {
    /// Empty means "Outreach: <lead name>"
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lead_name: String,
    pub profile_url: String,
    #[serde(default)]
    pub outreach_message: Option<String>,
    pub category: Option<Category>,
    pub stake_amount: Decimal,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Only meaningful with a deadline
    #[serde(default = "default_manual_reminder")]
    pub reminder: ReminderPolicy,
}

fn default_manual_reminder() -> ReminderPolicy {
    ReminderPolicy::OneHour
}

impl Default for ManualCommitment {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            lead_name: String::new(),
            profile_url: String::new(),
            outreach_message: None,
            category: None,
            stake_amount: Decimal::ZERO,
            deadline: None,
            reminder: default_manual_reminder(),
        }
    }
}

impl ManualCommitment {
    /// Validate and turn into a commitment stamped at `now`.
    pub fn into_commitment(self, now: DateTime<Utc>) -> Result<Commitment, EngineError> {
        let lead_name = self.lead_name.trim();
        let profile_url = self.profile_url.trim();
        if lead_name.is_empty() {
            return Err(EngineError::InvalidInput("lead name is required".into()));
        }
        if profile_url.is_empty() {
            return Err(EngineError::InvalidInput("profile URL is required".into()));
        }
        if self.stake_amount < Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "stake must not be negative, got {}",
                self.stake_amount
            )));
        }

        let title = match self.title.trim() {
            "" => format!("Outreach: {}", lead_name),
            t => t.to_string(),
        };

        let message = self.outreach_message.filter(|m| !m.trim().is_empty());
        let mut commitment = Commitment::new(
            title,
            self.description,
            self.category.unwrap_or(Category::Leads),
            self.stake_amount,
            now,
        )
        .with_outreach(SourcePlatform::Web, profile_url, message);
        if let Some(deadline) = self.deadline {
            commitment = commitment.with_deadline(deadline, self.reminder);
        }
        Ok(commitment)
    }
}
