//! Engine error taxonomy.
//!
//! Every variant is recoverable: the component that detects it handles it at
//! its boundary and the worst outcome is a commitment left in `missed` status.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::advisory::AdvisoryError;
use crate::ledger::LedgerError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Balance does not cover the requested stake; the user should top up
    #[error("Insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Wallet address could not be acquired
    #[error("Identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Input rejected before any state mutation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown commitment or lead
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Advisory service call failed after retries
    #[error("Advisory service error: {0}")]
    Advisory(#[from] AdvisoryError),

    /// The recovery workflow was closed while a call was in flight
    #[error("Recovery workflow closed before the result arrived")]
    RecoveryCancelled,

    /// Ledger refused a movement
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl EngineError {
    /// Short label used in structured logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::IdentityUnavailable(_) => "identity_unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Advisory(_) => "advisory",
            Self::RecoveryCancelled => "recovery_cancelled",
            Self::Ledger(_) => "ledger",
        }
    }

    /// Nothing in the engine core is fatal.
    pub const fn is_recoverable(&self) -> bool {
        true
    }

    /// Whether the user should be offered a top-up action.
    pub const fn needs_top_up(&self) -> bool {
        matches!(self, Self::InsufficientFunds { .. })
    }
}
