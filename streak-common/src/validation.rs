//! Configuration validation.
//!
//! Checks that amounts are non-negative and intervals, timeouts and formats
//! are usable before the engine starts.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::{AdvisoryConfig, Config, EngineConfig, IdentityConfig, ObservabilityConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];
const MAX_RETRIES: u32 = 10;
/// One year; larger values overflow deadline arithmetic
const MAX_DEADLINE_HOURS: i64 = 24 * 365;

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.observability.validate(),
            self.engine.validate(),
            self.advisory.validate(),
            self.identity.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load (with env overrides) and validate configuration.
    pub fn load_and_validate() -> crate::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(config)
    }
}

fn non_negative(field: &str, value: Decimal) -> ValidationResult<()> {
    if value < Decimal::ZERO {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("must not be negative, got {}", value),
        });
    }
    Ok(())
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        // Directive strings like "info,streak_engine=debug" are allowed
        let base = self.log_level.split(',').next().unwrap_or_default();
        if !LOG_LEVELS.contains(&base) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("unknown level '{}'", self.log_level),
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected json or pretty, got '{}'", self.log_format),
            });
        }
        Ok(())
    }
}

impl Validate for EngineConfig {
    fn validate(&self) -> ValidationResult<()> {
        non_negative("engine.initial_balance", self.initial_balance)?;
        non_negative("engine.lead_stake", self.lead_stake)?;
        non_negative("engine.recovery_fallback_stake", self.recovery_fallback_stake)?;

        if self.top_up_amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidValue {
                field: "engine.top_up_amount".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.monitor_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "engine.monitor_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.default_deadline_hours <= 0 || self.default_deadline_hours > MAX_DEADLINE_HOURS {
            return Err(ValidationError::InvalidValue {
                field: "engine.default_deadline_hours".into(),
                reason: format!("must be between 1 and {}", MAX_DEADLINE_HOURS),
            });
        }
        Ok(())
    }
}

impl Validate for AdvisoryConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::MissingField {
                field: "advisory.endpoint".into(),
            });
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "advisory.endpoint".into(),
                reason: "must be an http(s) URL".into(),
            });
        }
        if self.model.is_empty() {
            return Err(ValidationError::MissingField {
                field: "advisory.model".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "advisory.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_retries > MAX_RETRIES {
            return Err(ValidationError::InvalidValue {
                field: "advisory.max_retries".into(),
                reason: format!("must be at most {}", MAX_RETRIES),
            });
        }
        Ok(())
    }
}

impl Validate for IdentityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.simulated_address.is_empty() {
            return Err(ValidationError::MissingField {
                field: "identity.simulated_address".into(),
            });
        }
        Ok(())
    }
}
