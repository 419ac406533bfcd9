//! Test doubles shared by unit tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use streak_common::EngineConfig;

use crate::advisory::{
    AdvisoryError, AdvisoryService, FollowUpRequest, InboxScan, LeadDiscovery, LeadDraft,
    TaskAdjustment, FALLBACK_COACHING,
};
use crate::engine::CommitmentEngine;
use crate::error::Result;
use crate::identity::IdentityProvider;
use crate::lead::Lead;
use crate::task::{Commitment, MissReason, SourcePlatform};

pub const WALLET: &str = "0xTEST";

pub struct InstantWallet;

#[async_trait]
impl IdentityProvider for InstantWallet {
    async fn acquire(&self) -> Result<String> {
        Ok(WALLET.to_string())
    }
}

/// Advisor with canned answers.
#[derive(Default)]
pub struct StubAdvisor {
    /// `None` answers with the fallback adjustment
    pub adjustment: Option<TaskAdjustment>,
    /// Every call fails with a transport error
    pub fail: bool,
    /// Delay before answering `adjust_task`
    pub delay: Option<Duration>,
    pub discovery_text: String,
    pub leads: Vec<LeadDraft>,
    pub message: String,
    pub inbox: Option<InboxScan>,
    pub coaching: Option<String>,
    pub coaching_inputs: Mutex<Vec<(String, usize)>>,
}

impl StubAdvisor {
    fn check(&self) -> std::result::Result<(), AdvisoryError> {
        if self.fail {
            return Err(AdvisoryError::Transport("stub failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AdvisoryService for StubAdvisor {
    async fn adjust_task(
        &self,
        task: &Commitment,
        _reason: MissReason,
    ) -> std::result::Result<TaskAdjustment, AdvisoryError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        Ok(self
            .adjustment
            .clone()
            .unwrap_or_else(|| TaskAdjustment::fallback(task)))
    }

    async fn coaching_report(
        &self,
        history: &str,
        missed_count: usize,
    ) -> std::result::Result<String, AdvisoryError> {
        self.coaching_inputs
            .lock()
            .unwrap()
            .push((history.to_string(), missed_count));
        self.check()?;
        Ok(self
            .coaching
            .clone()
            .unwrap_or_else(|| FALLBACK_COACHING.to_string()))
    }

    async fn discover_leads(
        &self,
        _niche: &str,
        _location: &str,
        _goal: &str,
    ) -> std::result::Result<LeadDiscovery, AdvisoryError> {
        self.check()?;
        Ok(LeadDiscovery {
            text: self.discovery_text.clone(),
            sources: vec!["https://example.com/source".into()],
        })
    }

    async fn structure_leads(&self, _raw: &str) -> std::result::Result<Vec<LeadDraft>, AdvisoryError> {
        self.check()?;
        Ok(self.leads.clone())
    }

    async fn draft_message(
        &self,
        lead: &Lead,
        _value_prop: &str,
    ) -> std::result::Result<String, AdvisoryError> {
        self.check()?;
        Ok(format!("{} for {}", self.message, lead.name))
    }

    async fn scan_inbox(
        &self,
        _lead_name: &str,
        _platform: SourcePlatform,
    ) -> std::result::Result<InboxScan, AdvisoryError> {
        self.check()?;
        Ok(self.inbox.clone().unwrap_or_else(InboxScan::fallback))
    }

    async fn draft_follow_up(
        &self,
        request: &FollowUpRequest<'_>,
    ) -> std::result::Result<String, AdvisoryError> {
        self.check()?;
        Ok(format!("Following up, {}", request.lead_name))
    }
}

/// Engine with an instant wallet and the given opening balance.
pub fn engine_with(balance: Decimal, advisor: StubAdvisor) -> Arc<CommitmentEngine> {
    engine_sharing(balance, Arc::new(advisor))
}

/// Like [`engine_with`], keeping a handle on the advisor for inspection.
pub fn engine_sharing(balance: Decimal, advisor: Arc<StubAdvisor>) -> Arc<CommitmentEngine> {
    let config = EngineConfig {
        initial_balance: balance,
        ..EngineConfig::default()
    };
    Arc::new(
        CommitmentEngine::new(&config, advisor, Arc::new(InstantWallet))
            .expect("valid opening balance"),
    )
}
