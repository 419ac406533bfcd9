//! Configuration management for LeadStreak.
//!
//! The engine reads a single JSON file at `~/.leadstreak/config.json`.
//! A missing file means "all defaults".
//!
//! # Configuration Priority
//!
//! 1. Environment variables (STREAK_* prefix, provider API keys)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `STREAK_LOG_LEVEL` → observability.log_level
//! - `STREAK_LOG_FORMAT` → observability.log_format
//! - `STREAK_MONITOR_INTERVAL_SECS` → engine.monitor_interval_secs
//! - `STREAK_ADVISORY_ENDPOINT` → advisory.endpoint
//! - `GEMINI_API_KEY` / `GOOGLE_API_KEY` → advisory.api_key

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".leadstreak"),
        |dirs| dirs.home_dir().join(".leadstreak"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Commitment engine tunables
    #[serde(default)]
    pub engine: EngineConfig,

    /// Advisory service (generative model) configuration
    #[serde(default)]
    pub advisory: AdvisoryConfig,

    /// Simulated wallet connection
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("STREAK_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("STREAK_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(secs) = std::env::var("STREAK_MONITOR_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.engine.monitor_interval_secs = s;
            }
        }
        if let Ok(endpoint) = std::env::var("STREAK_ADVISORY_ENDPOINT") {
            self.advisory.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("GOOGLE_API_KEY")) {
            self.advisory.api_key = Some(key);
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .context(format!("Failed to create config directory {}", dir.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Commitment engine configuration.
///
/// Amounts are in the ledger's unit (SOL in the reference deployment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stakeable balance at process start
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,

    /// Deadline monitor period in seconds
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    /// Fixed stake for every lead converted into a commitment
    #[serde(default = "default_lead_stake")]
    pub lead_stake: Decimal,

    /// Stake used when an accepted recovery suggestion carries none
    #[serde(default = "default_recovery_fallback_stake")]
    pub recovery_fallback_stake: Decimal,

    /// Amount credited by one top-up action
    #[serde(default = "default_top_up_amount")]
    pub top_up_amount: Decimal,

    /// Deadline given to lead-derived and replacement commitments
    #[serde(default = "default_deadline_hours")]
    pub default_deadline_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            monitor_interval_secs: default_monitor_interval_secs(),
            lead_stake: default_lead_stake(),
            recovery_fallback_stake: default_recovery_fallback_stake(),
            top_up_amount: default_top_up_amount(),
            default_deadline_hours: default_deadline_hours(),
        }
    }
}

/// Advisory service configuration (Gemini `generateContent` API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    /// API base URL
    #[serde(default = "default_advisory_endpoint")]
    pub endpoint: String,

    /// Model for task adjustment, lead and message requests
    #[serde(default = "default_advisory_model")]
    pub model: String,

    /// Model for long-form coaching reports
    #[serde(default = "default_coaching_model")]
    pub coaching_model: String,

    /// API key; falls back to GEMINI_API_KEY / GOOGLE_API_KEY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_advisory_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_advisory_retries")]
    pub max_retries: u32,

    /// Backoff between retries in milliseconds
    #[serde(default = "default_advisory_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_advisory_endpoint(),
            model: default_advisory_model(),
            coaching_model: default_coaching_model(),
            api_key: None,
            timeout_secs: default_advisory_timeout(),
            max_retries: default_advisory_retries(),
            retry_backoff_ms: default_advisory_backoff_ms(),
        }
    }
}

/// Simulated wallet connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Simulated acquisition latency in milliseconds
    #[serde(default = "default_identity_latency_ms")]
    pub latency_ms: u64,

    /// Address handed out by the simulated wallet
    #[serde(default = "default_simulated_address")]
    pub simulated_address: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_identity_latency_ms(),
            simulated_address: default_simulated_address(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_initial_balance() -> Decimal {
    Decimal::new(420, 2)
}
fn default_monitor_interval_secs() -> u64 {
    5
}
fn default_lead_stake() -> Decimal {
    Decimal::new(20, 2)
}
fn default_recovery_fallback_stake() -> Decimal {
    Decimal::new(10, 2)
}
fn default_top_up_amount() -> Decimal {
    Decimal::new(2, 0)
}
fn default_deadline_hours() -> i64 {
    24
}
fn default_advisory_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_advisory_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_coaching_model() -> String {
    "gemini-3-pro-preview".to_string()
}
fn default_advisory_timeout() -> u64 {
    60
}
fn default_advisory_retries() -> u32 {
    2
}
fn default_advisory_backoff_ms() -> u64 {
    1000
}
fn default_identity_latency_ms() -> u64 {
    1200
}
fn default_simulated_address() -> String {
    "0x71C7656EC7ab88b098defB751B7401B5f6d8976F".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.engine.initial_balance, Decimal::new(420, 2));
        assert_eq!(config.engine.monitor_interval_secs, 5);
        assert_eq!(config.engine.lead_stake.to_string(), "0.20");
        assert_eq!(config.identity.latency_ms, 1200);
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{ "engine": { "initial_balance": 1.5 }, "observability": { "level": "debug" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine.initial_balance, Decimal::new(15, 1));
        assert_eq!(config.engine.top_up_amount, Decimal::new(2, 0));
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.advisory.max_retries, 2);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.engine.monitor_interval_secs = 9;
        config.advisory.model = "gemini-test".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.engine.monitor_interval_secs, 9);
        assert_eq!(loaded.advisory.model, "gemini-test");
        assert_eq!(loaded.engine.initial_balance, config.engine.initial_balance);
    }

    #[test]
    fn test_load_from_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
        assert!(matches!(
            err,
            crate::Error::WithContext { ref source, .. } if matches!(**source, crate::Error::Json(_))
        ));
    }
}
