//! Stake validation.
//!
//! Gate in front of every stake: a wallet identity must be bound and the
//! ledger must cover the amount. The validator never moves money itself;
//! [`StakeValidator::reserve`] hands back a ledger reservation the caller
//! debits once the commitment exists.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::identity::IdentityProvider;
use crate::ledger::{Ledger, LedgerError, Reservation};
use crate::notification::{EngineEvent, EventBus};

pub struct StakeValidator {
    provider: Arc<dyn IdentityProvider>,
    address: RwLock<Option<String>>,
    /// Serializes acquisitions so concurrent stakes connect once
    connecting: Mutex<()>,
    events: EventBus,
}

impl StakeValidator {
    pub fn new(provider: Arc<dyn IdentityProvider>, events: EventBus) -> Self {
        Self {
            provider,
            address: RwLock::new(None),
            connecting: Mutex::new(()),
            events,
        }
    }

    /// Bound wallet address, if any.
    pub async fn address(&self) -> Option<String> {
        self.address.read().await.clone()
    }

    /// Return the bound address, acquiring one first if needed.
    pub async fn ensure_identity(&self) -> Result<String> {
        if let Some(address) = self.address.read().await.clone() {
            return Ok(address);
        }

        let _guard = self.connecting.lock().await;
        // Another caller may have connected while we waited
        if let Some(address) = self.address.read().await.clone() {
            return Ok(address);
        }

        let address = self.provider.acquire().await.map_err(|e| {
            warn!(error = %e, "Identity acquisition failed");
            e
        })?;
        *self.address.write().await = Some(address.clone());
        info!(address = %address, "Identity bound");
        self.events.publish(EngineEvent::IdentityBound {
            address: address.clone(),
        });
        Ok(address)
    }

    /// Sufficiency check without holding funds.
    pub fn check_funds(&self, ledger: &Ledger, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "stake must not be negative, got {}",
                amount
            )));
        }
        if !ledger.covers(amount) {
            return Err(self.insufficient(amount, ledger.balance()));
        }
        Ok(())
    }

    /// Check and hold `amount` on the ledger.
    ///
    /// Callers must already hold the engine lock and have bound an identity.
    pub fn reserve(&self, ledger: &mut Ledger, amount: Decimal) -> Result<Reservation> {
        ledger.reserve(amount).map_err(|e| match e {
            LedgerError::Insufficient { required, available } => {
                self.insufficient(required, available)
            }
            LedgerError::NegativeAmount(value) => {
                EngineError::InvalidInput(format!("stake must not be negative, got {}", value))
            }
        })
    }

    fn insufficient(&self, required: Decimal, available: Decimal) -> EngineError {
        warn!(required = %required, available = %available, "Insufficient funds for stake");
        self.events
            .publish(EngineEvent::InsufficientFunds { required, available });
        EngineError::InsufficientFunds { required, available }
    }
}
