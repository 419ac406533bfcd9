//! Wallet identity providers.

use async_trait::async_trait;
use std::time::Duration;
use streak_common::IdentityConfig;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Source of the user's wallet address.
///
/// Acquisition may be slow; callers must not hold engine state while awaiting it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn acquire(&self) -> Result<String>;
}

/// Wallet stand-in that answers with a fixed address after a delay.
#[derive(Debug, Clone)]
pub struct SimulatedWallet {
    address: String,
    latency: Duration,
}

impl SimulatedWallet {
    pub fn new(address: impl Into<String>, latency: Duration) -> Self {
        Self {
            address: address.into(),
            latency,
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            config.simulated_address.clone(),
            Duration::from_millis(config.latency_ms),
        )
    }
}

#[async_trait]
impl IdentityProvider for SimulatedWallet {
    async fn acquire(&self) -> Result<String> {
        debug!(latency_ms = self.latency.as_millis() as u64, "Connecting simulated wallet");
        tokio::time::sleep(self.latency).await;
        if self.address.is_empty() {
            return Err(EngineError::IdentityUnavailable(
                "simulated wallet has no address".into(),
            ));
        }
        info!(address = %self.address, "Simulated wallet connected");
        Ok(self.address.clone())
    }
}
