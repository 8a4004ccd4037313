//! # Domain Errors
//!
//! Validation failures raised by ledger records before they reach a store.

use crate::domain::value_objects::order_status::OrderStatus;
use thiserror::Error;

/// Error raised when a record or request violates a domain rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Quantity is zero, negative, or exceeds the order size.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Price is missing, present where it must not be, or not positive.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// Identifier is empty or malformed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Balance components do not add up.
    #[error("inconsistent balance: {0}")]
    InconsistentBalance(String),

    /// Order status change not allowed by the lifecycle.
    #[error("invalid order transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },

    /// Query parameter not supported.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl DomainError {
    /// Creates an invalid quantity error.
    #[must_use]
    pub fn invalid_quantity(message: impl Into<String>) -> Self {
        Self::InvalidQuantity(message.into())
    }

    /// Creates an invalid price error.
    #[must_use]
    pub fn invalid_price(message: impl Into<String>) -> Self {
        Self::InvalidPrice(message.into())
    }

    /// Creates an invalid identifier error.
    #[must_use]
    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        Self::InvalidIdentifier(message.into())
    }

    /// Creates an invalid query error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Returns true if this error concerns the order lifecycle.
    #[must_use]
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// Result type for domain validation.
pub type DomainResult<T> = Result<T, DomainError>;

/// Rejects empty or whitespace-only identifiers.
///
/// # Errors
///
/// Returns `DomainError::InvalidIdentifier` naming `field`.
pub fn require_id(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::invalid_identifier(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
