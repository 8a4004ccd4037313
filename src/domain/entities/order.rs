//! # Order
//!
//! A trading order and its fill progress.
//!
//! # Invariants
//!
//! - `0 <= filled_quantity <= quantity`
//! - `status == Filled` implies `filled_quantity == quantity`
//! - market orders carry no price; limit and stop orders carry a positive one

use crate::domain::errors::{DomainError, DomainResult, require_id};
use crate::domain::value_objects::timestamp;
use crate::domain::value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trading order.
///
/// # Examples
///
/// ```
/// use exchange_data_adapter::domain::entities::Order;
/// use exchange_data_adapter::domain::value_objects::{OrderSide, OrderStatus};
/// use rust_decimal::Decimal;
///
/// let order = Order::limit("ord-1", "acc-1", "BTC-USDT", OrderSide::Buy,
///     Decimal::new(2, 0), Decimal::new(50_000, 0));
/// assert_eq!(order.status, OrderStatus::Pending);
/// assert_eq!(order.remaining_quantity(), Decimal::new(2, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub order_id: String,
    /// Owning account (not enforced in-process).
    pub account_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Order type.
    pub order_type: OrderType,
    /// Buy or sell.
    pub side: OrderSide,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Limit or stop price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Quantity filled so far.
    pub filled_quantity: Decimal,
    /// Volume-weighted fill price.
    pub average_price: Option<Decimal>,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Time of the latest fill update.
    pub filled_at: Option<DateTime<Utc>>,
    /// Cancellation time.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Opaque metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Order {
    /// Creates a pending order with nothing filled.
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        order_type: OrderType,
        side: OrderSide,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Self {
        let now = timestamp::now();
        Self {
            order_id: order_id.into(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            order_type,
            side,
            quantity,
            price,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            status: OrderStatus::Pending,
            time_in_force: TimeInForce::Gtc,
            created_at: now,
            updated_at: now,
            filled_at: None,
            cancelled_at: None,
            metadata: None,
        }
    }

    /// Creates a pending market order.
    #[must_use]
    pub fn market(
        order_id: impl Into<String>,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
    ) -> Self {
        Self::new(order_id, account_id, symbol, OrderType::Market, side, quantity, None)
    }

    /// Creates a pending limit order.
    #[must_use]
    pub fn limit(
        order_id: impl Into<String>,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self::new(
            order_id,
            account_id,
            symbol,
            OrderType::Limit,
            side,
            quantity,
            Some(price),
        )
    }

    /// Sets the time in force.
    #[must_use]
    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the metadata blob.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Returns true once the whole quantity has been filled.
    #[must_use]
    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// The status a caller should apply after recording a fill of
    /// `filled_quantity`.
    ///
    /// Terminal orders keep their status.
    #[must_use]
    pub fn status_after_fill(&self, filled_quantity: Decimal) -> OrderStatus {
        if self.status.is_terminal() {
            self.status
        } else if filled_quantity >= self.quantity {
            OrderStatus::Filled
        } else if filled_quantity > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            self.status
        }
    }

    /// Checks a proposed fill against the order size and lifecycle.
    ///
    /// A fill below the current filled quantity is not rejected here.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidQuantity` if the fill is negative or exceeds the order
    /// - `DomainError::InvalidPrice` if the average price is negative
    /// - `DomainError::InvalidTransition` if the order is terminal
    pub fn check_fill(&self, filled_quantity: Decimal, average_price: Decimal) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: self.status_after_fill(filled_quantity),
            });
        }
        check_fill_bounds(self.quantity, filled_quantity, average_price)
    }

    /// Checks the record before it is stored.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` describing the first violated invariant.
    pub fn validate(&self) -> DomainResult<()> {
        require_id("order_id", &self.order_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("symbol", &self.symbol)?;
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity("quantity must be positive"));
        }
        match (self.order_type.requires_price(), self.price) {
            (true, None) => {
                return Err(DomainError::invalid_price(format!(
                    "{} order requires a price",
                    self.order_type
                )));
            }
            (false, Some(_)) => {
                return Err(DomainError::invalid_price("market order must not carry a price"));
            }
            (_, Some(price)) if price <= Decimal::ZERO => {
                return Err(DomainError::invalid_price("price must be positive"));
            }
            _ => {}
        }
        check_fill_bounds(
            self.quantity,
            self.filled_quantity,
            self.average_price.unwrap_or(Decimal::ZERO),
        )?;
        if self.status == OrderStatus::Filled && !self.is_fully_filled() {
            return Err(DomainError::invalid_quantity(
                "filled order must have filled_quantity equal to quantity",
            ));
        }
        Ok(())
    }
}

/// Bounds shared by stored orders and fill updates.
pub(crate) fn check_fill_bounds(
    quantity: Decimal,
    filled_quantity: Decimal,
    average_price: Decimal,
) -> DomainResult<()> {
    if filled_quantity < Decimal::ZERO {
        return Err(DomainError::invalid_quantity("filled quantity must not be negative"));
    }
    if filled_quantity > quantity {
        return Err(DomainError::invalid_quantity(format!(
            "filled quantity {filled_quantity} exceeds order quantity {quantity}"
        )));
    }
    if average_price < Decimal::ZERO {
        return Err(DomainError::invalid_price("average price must not be negative"));
    }
    Ok(())
}
