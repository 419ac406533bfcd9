//! In-memory commitment store and accountability log.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Category, Commitment, TaskStatus};
use crate::error::{EngineError, Result};

/// Window used by the "upcoming" filter.
const UPCOMING_WINDOW_HOURS: i64 = 24;

/// Outcome recorded in the accountability log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountabilityAction {
    Success,
    Missed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountabilityEntry {
    pub task_id: String,
    pub action: AccountabilityAction,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_applied: Option<Decimal>,
}

/// Sort order for [`TaskQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSort {
    /// Newest first
    #[default]
    CreatedAt,
    /// Soonest first, commitments without a deadline last
    Deadline,
    /// Highest stake first
    Stake,
    /// Alphabetical by category name
    Category,
}

/// Filter for the open-commitment list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQuery {
    pub category: Option<Category>,
    /// Only commitments due within the next 24 hours
    #[serde(default)]
    pub upcoming_only: bool,
    #[serde(default)]
    pub sort: TaskSort,
}

/// Activity for one calendar day (UTC), as of the end of that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayActivity {
    pub date: NaiveDate,
    pub completed: usize,
    pub active: usize,
    pub stake_at_risk: Decimal,
}

/// Result of a completion attempt.
#[derive(Debug, Clone)]
pub enum Completion {
    Completed(Commitment),
    /// Already completed today; nothing changed
    Unchanged(Commitment),
}

/// Ordered collection of commitments.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<Commitment>,
    log: Vec<AccountabilityEntry>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, commitment: Commitment) {
        self.tasks.push(commitment);
    }

    pub fn get(&self, id: &str) -> Option<&Commitment> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Commitment> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Commitment> {
        self.tasks.iter_mut()
    }

    /// All commitments in insertion order.
    pub fn all(&self) -> &[Commitment] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether an active commitment already links `lead_id`.
    pub fn has_active_for_lead(&self, lead_id: &str) -> bool {
        self.tasks
            .iter()
            .any(|t| t.is_active() && t.lead_id.as_deref() == Some(lead_id))
    }

    /// Missed commitments, most recently due first.
    pub fn missed(&self) -> Vec<Commitment> {
        let mut missed: Vec<Commitment> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Missed)
            .cloned()
            .collect();
        missed.sort_by(|a, b| {
            let ka = a.deadline.unwrap_or(a.created_at);
            let kb = b.deadline.unwrap_or(b.created_at);
            kb.cmp(&ka)
        });
        missed
    }

    /// Open (not completed, not missed) commitments matching `query`.
    pub fn query(&self, query: &TaskQuery, now: DateTime<Utc>) -> Vec<Commitment> {
        let horizon = now + Duration::hours(UPCOMING_WINDOW_HOURS);
        let mut out: Vec<Commitment> = self
            .tasks
            .iter()
            .filter(|t| !matches!(t.status, TaskStatus::Completed | TaskStatus::Missed))
            .filter(|t| query.category.map_or(true, |c| t.category == c))
            .filter(|t| {
                !query.upcoming_only
                    || t.deadline.is_some_and(|d| d >= now && d <= horizon)
            })
            .cloned()
            .collect();

        match query.sort {
            TaskSort::CreatedAt => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            TaskSort::Deadline => out.sort_by(|a, b| match (a.deadline, b.deadline) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }),
            TaskSort::Stake => out.sort_by(|a, b| b.stake_amount.cmp(&a.stake_amount)),
            TaskSort::Category => {
                out.sort_by(|a, b| a.category.as_str().cmp(b.category.as_str()))
            }
        }
        out
    }

    /// Mark an active commitment completed and extend its streak.
    ///
    /// Completing twice on the same calendar day is a no-op.
    pub fn complete(&mut self, id: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<Completion> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("commitment {}", id)))?;

        if task.last_completed == Some(today) {
            return Ok(Completion::Unchanged(task.clone()));
        }
        if !task.is_active() {
            return Err(EngineError::InvalidTransition(format!(
                "commitment {} is {} and cannot be completed",
                id,
                task.status.as_str()
            )));
        }

        task.streak += 1;
        task.last_completed = Some(today);
        task.status = TaskStatus::Completed;
        let snapshot = task.clone();

        self.log.push(AccountabilityEntry {
            task_id: id.to_string(),
            action: AccountabilityAction::Success,
            at: now,
            penalty_applied: None,
        });
        Ok(Completion::Completed(snapshot))
    }

    pub(crate) fn record_missed(&mut self, task_id: &str, penalty: Decimal, at: DateTime<Utc>) {
        self.log.push(AccountabilityEntry {
            task_id: task_id.to_string(),
            action: AccountabilityAction::Missed,
            at,
            penalty_applied: Some(penalty),
        });
    }

    pub fn accountability_log(&self) -> &[AccountabilityEntry] {
        &self.log
    }

    /// Number of commitments per status.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in &self.tasks {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Sum of stakes on active commitments.
    pub fn stake_at_risk(&self) -> Decimal {
        self.tasks
            .iter()
            .filter(|t| t.is_active())
            .map(|t| t.stake_amount)
            .sum()
    }

    /// Per-day activity for the `days` days ending today, oldest first.
    pub fn daily_activity(&self, now: DateTime<Utc>, days: u32) -> Vec<DayActivity> {
        let today = now.date_naive();
        (0..days)
            .rev()
            .filter_map(|back| today.checked_sub_days(chrono::Days::new(back.into())))
            .map(|date| self.activity_on(date))
            .collect()
    }

    fn activity_on(&self, date: NaiveDate) -> DayActivity {
        let end_of_day = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|t| t.and_utc())
            .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN).and_utc());
        let created_by = |t: &&Commitment| t.created_at <= end_of_day;
        let due_later = |t: &Commitment| t.deadline.is_some_and(|d| d > end_of_day);

        let completed = self
            .tasks
            .iter()
            .filter(|t| t.last_completed == Some(date))
            .count();
        let active = self
            .tasks
            .iter()
            .filter(created_by)
            .filter(|t| t.last_completed.map_or(true, |d| d > date))
            .filter(|t| t.status != TaskStatus::Missed || due_later(t))
            .count();
        let stake_at_risk = self
            .tasks
            .iter()
            .filter(created_by)
            .filter(|t| {
                t.is_active() || (due_later(t) && t.status != TaskStatus::Completed)
            })
            .map(|t| t.stake_amount)
            .sum();

        DayActivity {
            date,
            completed,
            active,
            stake_at_risk,
        }
    }

    /// Soonest deadline among active commitments.
    pub fn nearest_deadline(&self) -> Option<DateTime<Utc>> {
        self.tasks
            .iter()
            .filter(|t| t.is_active())
            .filter_map(|t| t.deadline)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ReminderPolicy;

    fn task(title: &str, category: Category, stake: i64, created: DateTime<Utc>) -> Commitment {
        Commitment::new(title, "", category, Decimal::new(stake, 2), created)
    }

    #[test]
    fn test_complete_extends_streak_once_per_day() {
        let now = Utc::now();
        let today = now.date_naive();
        let mut store = TaskStore::new();
        let t = task("Write post", Category::Marketing, 10, now);
        let id = t.id.clone();
        store.insert(t);

        match store.complete(&id, today, now).unwrap() {
            Completion::Completed(c) => {
                assert_eq!(c.streak, 1);
                assert_eq!(c.status, TaskStatus::Completed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            store.complete(&id, today, now).unwrap(),
            Completion::Unchanged(c) if c.streak == 1
        ));
        assert_eq!(store.accountability_log().len(), 1);
    }

    #[test]
    fn test_complete_rejects_missed() {
        let now = Utc::now();
        let mut store = TaskStore::new();
        let mut t = task("Call", Category::Leads, 10, now);
        t.status = TaskStatus::Missed;
        let id = t.id.clone();
        store.insert(t);

        assert!(matches!(
            store.complete(&id, now.date_naive(), now),
            Err(EngineError::InvalidTransition(_))
        ));
        assert!(matches!(
            store.complete("nope", now.date_naive(), now),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_query_sorts_and_filters() {
        let now = Utc::now();
        let mut store = TaskStore::new();
        let a = task("a", Category::Product, 30, now - Duration::hours(3))
            .with_deadline(now + Duration::hours(30), ReminderPolicy::None);
        let b = task("b", Category::Health, 50, now - Duration::hours(2));
        let c = task("c", Category::Leads, 10, now - Duration::hours(1))
            .with_deadline(now + Duration::hours(2), ReminderPolicy::OneHour);
        let mut done = task("d", Category::Leads, 99, now);
        done.status = TaskStatus::Completed;
        for t in [a, b, c, done] {
            store.insert(t);
        }

        let titles = |q: TaskQuery| -> Vec<String> {
            store.query(&q, now).into_iter().map(|t| t.title).collect()
        };

        assert_eq!(titles(TaskQuery::default()), ["c", "b", "a"]);
        assert_eq!(
            titles(TaskQuery { sort: TaskSort::Deadline, ..Default::default() }),
            ["c", "a", "b"]
        );
        assert_eq!(
            titles(TaskQuery { sort: TaskSort::Stake, ..Default::default() }),
            ["b", "a", "c"]
        );
        assert_eq!(
            titles(TaskQuery { sort: TaskSort::Category, ..Default::default() }),
            ["b", "c", "a"]
        );
        assert_eq!(
            titles(TaskQuery { upcoming_only: true, ..Default::default() }),
            ["c"]
        );
        assert_eq!(
            titles(TaskQuery { category: Some(Category::Product), ..Default::default() }),
            ["a"]
        );
    }

    #[test]
    fn test_dashboard_aggregates() {
        let now = Utc::now();
        let mut store = TaskStore::new();
        store.insert(
            task("x", Category::Leads, 20, now)
                .with_deadline(now + Duration::hours(5), ReminderPolicy::None),
        );
        store.insert(
            task("y", Category::Leads, 30, now)
                .with_deadline(now + Duration::hours(1), ReminderPolicy::None),
        );
        let mut missed = task("z", Category::Leads, 40, now);
        missed.status = TaskStatus::Missed;
        store.insert(missed);

        assert_eq!(store.stake_at_risk(), Decimal::new(50, 2));
        assert_eq!(store.nearest_deadline(), Some(now + Duration::hours(1)));
        assert_eq!(store.status_counts().get(&TaskStatus::Missed), Some(&1));
        assert_eq!(store.missed().len(), 1);
    }

    #[test]
    fn test_daily_activity_window() {
        let now = Utc::now();
        let today = now.date_naive();
        let mut store = TaskStore::new();

        let mut done = task("done", Category::Health, 10, now - Duration::days(3));
        store.insert(done.clone());
        let id = done.id.clone();
        store.complete(&id, today, now).unwrap();
        done = store.get(&id).unwrap().clone();
        assert_eq!(done.last_completed, Some(today));

        store.insert(task("open", Category::Leads, 25, now - Duration::days(1)));

        let week = store.daily_activity(now, 7);
        assert_eq!(week.len(), 7);
        assert_eq!(week[6].date, today);
        assert_eq!(week[6].completed, 1);
        // "done" was still open two days ago, "open" did not exist yet
        assert_eq!(week[4].active, 1);
        assert_eq!(week[4].stake_at_risk, Decimal::ZERO);
        assert_eq!(week[6].stake_at_risk, Decimal::new(25, 2));
        assert_eq!(week[0].active, 0);
    }
}
