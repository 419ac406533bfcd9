//! Stake ledger.
//!
//! Owns the available stakeable balance. Stakes move through a two-step
//! reservation: [`Ledger::reserve`] takes the amount out of the available
//! balance into a held bucket, then [`Ledger::debit`] finalizes it once the
//! commitment exists (or [`Ledger::release`] returns it). Because both steps
//! need `&mut Ledger`, a caller holding the engine lock performs the whole
//! sequence atomically, and the available balance can never go negative.
//!
//! Outcomes do not move money: a miss forfeits a stake that was already
//! debited, and a completion clears it. Both are journaled for the
//! accountability views.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Ledger refusal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Decimal),

    #[error("{required} required but only {available} available")]
    Insufficient { required: Decimal, available: Decimal },
}

/// Kind of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    /// Top-up credited to the balance
    Deposit,
    /// Stake debited for a new commitment
    Stake,
    /// Stake lost to a missed deadline (no balance movement)
    Forfeit,
    /// Stake preserved by a completed commitment (no balance movement)
    Clear,
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: LedgerEntryKind,
    pub amount: Decimal,
    pub task_id: Option<String>,
    pub balance_after: Decimal,
    pub at: DateTime<Utc>,
}

/// Funds held between a sufficiency check and the debit.
///
/// Must be passed to [`Ledger::debit`] or [`Ledger::release`].
#[derive(Debug)]
#[must_use = "a reservation holds funds until it is debited or released"]
pub struct Reservation {
    amount: Decimal,
}

impl Reservation {
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Read-only view of the ledger for presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balance: Decimal,
    pub held: Decimal,
    pub total_deposited: Decimal,
    pub total_staked: Decimal,
    pub total_forfeited: Decimal,
    pub total_cleared: Decimal,
}

/// Process-wide stakeable balance.
#[derive(Debug)]
pub struct Ledger {
    balance: Decimal,
    held: Decimal,
    journal: Vec<LedgerEntry>,
}

impl Ledger {
    /// Create a ledger with an opening balance. Negative openings are refused.
    pub fn new(opening_balance: Decimal) -> Result<Self, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(opening_balance));
        }
        Ok(Self {
            balance: opening_balance,
            held: Decimal::ZERO,
            journal: Vec::new(),
        })
    }

    /// Available balance.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Funds currently reserved but not yet debited.
    pub fn held(&self) -> Decimal {
        self.held
    }

    /// Whether the available balance covers `amount`.
    pub fn covers(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Check sufficiency and hold `amount`.
    pub fn reserve(&mut self, amount: Decimal) -> Result<Reservation, LedgerError> {
        check_amount(amount)?;
        if !self.covers(amount) {
            return Err(LedgerError::Insufficient {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.held += amount;
        debug!(amount = %amount, balance = %self.balance, "Stake reserved");
        Ok(Reservation { amount })
    }

    /// Finalize a reservation as a stake on `task_id`.
    pub fn debit(&mut self, reservation: Reservation, task_id: &str) -> Decimal {
        self.held -= reservation.amount;
        self.push(LedgerEntryKind::Stake, reservation.amount, Some(task_id));
        self.balance
    }

    /// Return a reservation to the available balance.
    pub fn release(&mut self, reservation: Reservation) -> Decimal {
        self.held -= reservation.amount;
        self.balance += reservation.amount;
        debug!(amount = %reservation.amount, "Reservation released");
        self.balance
    }

    /// Credit a top-up to the available balance.
    pub fn credit(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        check_amount(amount)?;
        self.balance += amount;
        self.push(LedgerEntryKind::Deposit, amount, None);
        Ok(self.balance)
    }

    /// Journal a forfeited stake.
    pub fn record_forfeit(&mut self, amount: Decimal, task_id: &str) {
        self.push(LedgerEntryKind::Forfeit, amount, Some(task_id));
    }

    /// Journal a cleared stake.
    pub fn record_clear(&mut self, amount: Decimal, task_id: &str) {
        self.push(LedgerEntryKind::Clear, amount, Some(task_id));
    }

    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let total = |kind: LedgerEntryKind| -> Decimal {
            self.journal
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.amount)
                .sum()
        };
        LedgerSnapshot {
            balance: self.balance,
            held: self.held,
            total_deposited: total(LedgerEntryKind::Deposit),
            total_staked: total(LedgerEntryKind::Stake),
            total_forfeited: total(LedgerEntryKind::Forfeit),
            total_cleared: total(LedgerEntryKind::Clear),
        }
    }

    fn push(&mut self, kind: LedgerEntryKind, amount: Decimal, task_id: Option<&str>) {
        self.journal.push(LedgerEntry {
            kind,
            amount,
            task_id: task_id.map(String::from),
            balance_after: self.balance,
            at: Utc::now(),
        });
    }
}

fn check_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::NegativeAmount(amount));
    }
    Ok(())
}
