//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use streak_common::EngineConfig;
use streak_engine::advisory::{ModelReply, StructuredRequest, StructuredTransport};
use streak_engine::{Advisor, AdvisoryError, CommitmentEngine, SimulatedWallet};

pub const WALLET: &str = "0xA11CE";

/// Transport answering each operation with a canned reply.
#[derive(Default)]
pub struct CannedTransport {
    replies: HashMap<&'static str, String>,
    fail: bool,
    pub seen: Mutex<Vec<&'static str>>,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reply(mut self, operation: &'static str, text: impl Into<String>) -> Self {
        self.replies.insert(operation, text.into());
        self
    }
}

#[async_trait]
impl StructuredTransport for CannedTransport {
    async fn send(&self, request: &StructuredRequest) -> Result<ModelReply, AdvisoryError> {
        self.seen.lock().unwrap().push(request.operation);
        if self.fail {
            return Err(AdvisoryError::Transport("connection refused".into()));
        }
        Ok(ModelReply {
            text: self.replies.get(request.operation).cloned().unwrap_or_default(),
            sources: Vec::new(),
        })
    }
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Engine over `transport` with an instant wallet.
pub fn engine(balance: &str, transport: CannedTransport) -> Arc<CommitmentEngine> {
    engine_with_advisor(balance, Advisor::new(transport))
}

pub fn engine_with_advisor<T>(balance: &str, advisor: Advisor<T>) -> Arc<CommitmentEngine>
where
    T: StructuredTransport + 'static,
{
    let config = EngineConfig {
        initial_balance: dec(balance),
        ..EngineConfig::default()
    };
    let wallet = SimulatedWallet::new(WALLET, Duration::ZERO);
    Arc::new(CommitmentEngine::new(&config, Arc::new(advisor), Arc::new(wallet)).unwrap())
}
