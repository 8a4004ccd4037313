//! # Balance
//!
//! Holdings of one symbol in one account.
//!
//! # Invariants
//!
//! - `total_balance == available_balance + locked_balance` at every observable point
//! - `(account_id, symbol)` is unique
//!
//! Balances are created through an upsert and afterwards mutated by delta
//! application; `total_balance` is always derived, never written blindly.

use crate::domain::errors::{DomainError, DomainResult, require_id};
use crate::domain::value_objects::timestamp;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Balance of one symbol held by one account.
///
/// # Examples
///
/// ```
/// use exchange_data_adapter::domain::entities::Balance;
/// use rust_decimal::Decimal;
///
/// let mut balance = Balance::new("acc-1", "USDT", Decimal::new(100, 0), Decimal::ZERO);
/// balance.apply_delta(Decimal::new(-25, 0), Decimal::new(25, 0));
/// assert_eq!(balance.available_balance, Decimal::new(75, 0));
/// assert_eq!(balance.total_balance, Decimal::new(100, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance identifier.
    pub balance_id: String,
    /// Owning account.
    pub account_id: String,
    /// Asset symbol.
    pub symbol: String,
    /// Freely usable amount.
    pub available_balance: Decimal,
    /// Amount reserved by working orders.
    pub locked_balance: Decimal,
    /// `available_balance + locked_balance`.
    pub total_balance: Decimal,
    /// Last modification time.
    pub last_updated: DateTime<Utc>,
    /// Opaque metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Balance {
    /// Creates a balance snapshot with a fresh identifier and derived total.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        available_balance: Decimal,
        locked_balance: Decimal,
    ) -> Self {
        Self {
            balance_id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            available_balance,
            locked_balance,
            total_balance: available_balance + locked_balance,
            last_updated: timestamp::now(),
            metadata: None,
        }
    }

    /// Sets the balance identifier.
    #[must_use]
    pub fn with_id(mut self, balance_id: impl Into<String>) -> Self {
        self.balance_id = balance_id.into();
        self
    }

    /// Sets the metadata blob.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns true if the total equals available plus locked.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total_balance == self.available_balance + self.locked_balance
    }

    /// Adds the deltas and recomputes the total from the new components.
    pub fn apply_delta(&mut self, available_delta: Decimal, locked_delta: Decimal) {
        self.available_balance += available_delta;
        self.locked_balance += locked_delta;
        self.total_balance = self.available_balance + self.locked_balance;
        self.last_updated = timestamp::now();
    }

    /// Replaces both components and recomputes the total.
    pub fn set_components(&mut self, available_balance: Decimal, locked_balance: Decimal) {
        self.available_balance = available_balance;
        self.locked_balance = locked_balance;
        self.total_balance = available_balance + locked_balance;
        self.last_updated = timestamp::now();
    }

    /// Checks the snapshot before it is stored.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidIdentifier` if an id is blank
    /// - `DomainError::InconsistentBalance` if the total does not add up
    pub fn validate(&self) -> DomainResult<()> {
        require_id("balance_id", &self.balance_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("symbol", &self.symbol)?;
        if !self.is_consistent() {
            return Err(DomainError::InconsistentBalance(format!(
                "total {} != available {} + locked {}",
                self.total_balance, self.available_balance, self.locked_balance
            )));
        }
        Ok(())
    }
}
