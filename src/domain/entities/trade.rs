//! # Trade
//!
//! An executed fill. Trades are append-only settlement records and are
//! never updated once created.

use crate::domain::errors::{DomainError, DomainResult, require_id};
use crate::domain::value_objects::OrderSide;
use crate::domain::value_objects::timestamp;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade identifier.
    pub trade_id: String,
    /// Order that produced the fill.
    pub order_id: String,
    /// Account charged for the fill.
    pub account_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Filled quantity.
    pub quantity: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Fee charged.
    pub fee: Decimal,
    /// Currency the fee is charged in.
    pub fee_currency: String,
    /// Execution time.
    pub executed_at: DateTime<Utc>,
    /// Opaque metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Trade {
    /// Creates a fee-free trade executed now.
    #[must_use]
    pub fn new(
        trade_id: impl Into<String>,
        order_id: impl Into<String>,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            trade_id: trade_id.into(),
            order_id: order_id.into(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            fee: Decimal::ZERO,
            fee_currency: String::new(),
            executed_at: timestamp::now(),
            metadata: None,
        }
    }

    /// Sets the fee and its currency.
    #[must_use]
    pub fn with_fee(mut self, fee: Decimal, fee_currency: impl Into<String>) -> Self {
        self.fee = fee;
        self.fee_currency = fee_currency.into();
        self
    }

    /// Sets the execution time.
    #[must_use]
    pub fn with_executed_at(mut self, executed_at: DateTime<Utc>) -> Self {
        self.executed_at = executed_at;
        self
    }

    /// Sets the metadata blob.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Quantity times price, before fees.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    /// Checks the record before it is stored.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` describing the first violated invariant.
    pub fn validate(&self) -> DomainResult<()> {
        require_id("trade_id", &self.trade_id)?;
        require_id("order_id", &self.order_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("symbol", &self.symbol)?;
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity("trade quantity must be positive"));
        }
        if self.price <= Decimal::ZERO {
            return Err(DomainError::invalid_price("trade price must be positive"));
        }
        if self.fee < Decimal::ZERO {
            return Err(DomainError::invalid_quantity("fee must not be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notional_is_exact() {
        let trade = Trade::new(
            "t-1",
            "o-1",
            "a-1",
            "ETH-USDT",
            OrderSide::Buy,
            Decimal::new(15, 1),
            Decimal::new(200_001, 2),
        );
        assert_eq!(trade.notional(), Decimal::new(3_000_015, 3));
    }

    #[test]
    fn negative_fee_is_invalid() {
        let trade = Trade::new("t-1", "o-1", "a-1", "ETH-USDT", OrderSide::Sell, Decimal::ONE, Decimal::ONE)
            .with_fee(Decimal::NEGATIVE_ONE, "USDT");
        assert!(trade.validate().is_err());
    }
}
