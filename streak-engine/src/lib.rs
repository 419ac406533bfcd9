//! LeadStreak Commitment Engine
//!
//! Users stake a small balance on time-bound commitments. Completing a
//! commitment extends its streak; missing the deadline forfeits the stake and
//! opens a guided recovery that proposes a smaller replacement.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        CommitmentEngine                           │
//! │            (single async mutex over all engine state)             │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────────┐   │
//! │  │  Ledger  │  │  Tasks   │  │  Leads   │  │  Recovery slot   │   │
//! │  └──────────┘  └──────────┘  └──────────┘  └──────────────────┘   │
//! └───────▲──────────────▲───────────────▲───────────────▲────────────┘
//!         │              │               │               │
//!  StakeValidator  DeadlineMonitor   Lead bridge    AdvisoryService
//!  (identity)      (periodic pass)   prospecting    (Gemini transport)
//! ```
//!
//! State changes are published on a broadcast [`EventBus`]; nothing in the
//! engine waits for a subscriber.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod advisory;
pub mod bridge;
pub mod coach;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lead;
pub mod ledger;
pub mod monitor;
pub mod notification;
pub mod prospecting;
pub mod recovery;
pub mod task;
pub mod validator;

#[cfg(test)]
mod testing;

pub use advisory::{Advisor, AdvisoryError, AdvisoryService, GeminiTransport};
pub use engine::{CommitmentEngine, DashboardSnapshot, EngineSettings};
pub use error::{EngineError, Result};
pub use identity::{IdentityProvider, SimulatedWallet};
pub use lead::{Lead, LeadStatus, ResponseStatus};
pub use ledger::{Ledger, LedgerSnapshot, Reservation};
pub use monitor::{DeadlineMonitor, MonitorHandle, PassReport};
pub use notification::{EngineEvent, EventBus};
pub use recovery::{RecoveryPhase, RecoveryView};
pub use task::{Category, Commitment, ManualCommitment, MissReason, ReminderPolicy, TaskStatus};

use std::sync::Arc;
use std::time::Duration;
use streak_common::{AdvisoryConfig, Config};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// Startup warning when no advisory API key is configured.
///
/// Without a key every advisory call fails fast. Coaching and discovery
/// degrade to defaults; recovery advice, personalization and follow-ups
/// return the error.
pub fn missing_credentials_warning(config: &AdvisoryConfig) -> Option<&'static str> {
    let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());
    (!has_key).then_some(
        "No advisory API key configured: recovery advice, personalization and follow-ups \
         are unavailable; coaching and lead discovery fall back to defaults",
    )
}

/// Daemon wrapper: engine plus its background tasks.
pub struct StreakService {
    config: Config,
    engine: Arc<CommitmentEngine>,
}

impl StreakService {
    /// Build the engine with the Gemini advisor and the simulated wallet.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let advisor = Advisor::new(GeminiTransport::new(config.advisory.clone()));
        let wallet = SimulatedWallet::from_config(&config.identity);
        let engine = CommitmentEngine::new(&config.engine, Arc::new(advisor), Arc::new(wallet))?;
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn engine(&self) -> Arc<CommitmentEngine> {
        Arc::clone(&self.engine)
    }

    /// Run the deadline monitor and log engine events until Ctrl-C.
    pub async fn start(self) -> anyhow::Result<()> {
        let period = Duration::from_secs(self.config.engine.monitor_interval_secs);

        let events = self.engine.subscribe();
        let logger = tokio::spawn(log_events(events));

        let monitor = DeadlineMonitor::spawn(self.engine(), period);
        info!(
            balance = %self.engine.balance().await,
            interval_secs = period.as_secs(),
            "Commitment engine running"
        );

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");

        monitor.stop().await;
        logger.abort();
        Ok(())
    }
}

/// Log every engine event until the bus closes.
async fn log_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(event = %event.to_message(), "Engine event"),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
