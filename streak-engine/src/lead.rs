//! Prospective contacts discovered through the advisory service.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::task::SourcePlatform;

/// Outreach status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    Pending,
    Approved,
    Sent,
    Rejected,
    Completed,
}

/// Last observed reply state for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    Responded,
    NoReply,
    Declined,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub personalized_message: String,
    pub platform: SourcePlatform,
    pub contact_info: String,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub follow_up_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response_status: Option<ResponseStatus>,
}

impl Lead {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        platform: SourcePlatform,
        contact_info: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            title: title.into(),
            company: company.into(),
            email: None,
            summary: String::new(),
            personalized_message: String::new(),
            platform,
            contact_info: contact_info.into(),
            status: LeadStatus::Pending,
            follow_up_count: 0,
            last_response_status: None,
        }
    }
}

/// Leads in discovery order. Removing a lead never touches commitments.
#[derive(Debug, Default)]
pub struct LeadStore {
    leads: Vec<Lead>,
}

impl LeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, leads: impl IntoIterator<Item = Lead>) {
        self.leads.extend(leads);
    }

    /// Insert or replace by id.
    pub fn upsert(&mut self, lead: Lead) {
        match self.leads.iter_mut().find(|l| l.id == lead.id) {
            Some(existing) => *existing = lead,
            None => self.leads.push(lead),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Lead> {
        self.leads.iter().find(|l| l.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Lead> {
        self.leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("lead {}", id)))
    }

    pub fn remove(&mut self, id: &str) -> Option<Lead> {
        let index = self.leads.iter().position(|l| l.id == id)?;
        Some(self.leads.remove(index))
    }

    pub fn all(&self) -> &[Lead] {
        &self.leads
    }

    pub fn with_status(&self, status: LeadStatus) -> Vec<Lead> {
        self.leads.iter().filter(|l| l.status == status).cloned().collect()
    }
}
