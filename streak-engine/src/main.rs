//! LeadStreak engine daemon.
//!
//! Runs the deadline monitor over an in-memory commitment engine and logs
//! every engine event.

use anyhow::Result;
use streak_common::logging::init_logging;
use streak_common::Config;
use streak_engine::{missing_credentials_warning, StreakService};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_and_validate()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("LeadStreak engine v{}", env!("CARGO_PKG_VERSION"));
    if let Some(warning) = missing_credentials_warning(&config.advisory) {
        tracing::warn!("{}", warning);
    }

    let service = StreakService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
