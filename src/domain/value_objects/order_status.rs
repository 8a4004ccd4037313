//! # Order Status
//!
//! Order lifecycle state machine.
//!
//! # State Machine
//!
//! ```text
//! Pending → Open ⇄ PartiallyFilled → Filled
//!   │        │          │
//!   ├────────┴──────────┴→ Cancelled
//!   ├────────┴──────────┴→ Expired
//!   └→ Rejected
//! ```
//!
//! A fill recorded while the order is still pending takes it straight to
//! `PartiallyFilled` or `Filled`.
//!
//! `Filled`, `Cancelled`, `Rejected` and `Expired` are terminal.
//!
//! # Examples
//!
//! ```
//! use exchange_data_adapter::domain::value_objects::order_status::OrderStatus;
//!
//! assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Open));
//! assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Open));
//! ```

use crate::domain::value_objects::enums::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the venue, not yet working.
    #[default]
    Pending,
    /// Working on the book with no fills.
    Open,
    /// Working on the book with some quantity filled.
    PartiallyFilled,
    /// Fully filled (terminal).
    Filled,
    /// Cancelled before completion (terminal).
    Cancelled,
    /// Rejected by the venue (terminal).
    Rejected,
    /// Lapsed per its time in force (terminal).
    Expired,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Open,
        Self::PartiallyFilled,
        Self::Filled,
        Self::Cancelled,
        Self::Rejected,
        Self::Expired,
    ];

    /// Returns true if this is a terminal state.
    ///
    /// Terminal orders admit no further change of status, filled
    /// quantity or average price.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is still working (pending or on the book).
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this state can transition to the target state.
    ///
    /// - Pending → Open, PartiallyFilled, Filled, Cancelled, Rejected, Expired
    /// - Open → PartiallyFilled, Filled, Cancelled, Expired
    /// - PartiallyFilled → Open, Filled, Cancelled, Expired
    /// - Terminal states → (none)
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Open)
                | (Self::Pending, Self::PartiallyFilled)
                | (Self::Pending, Self::Filled)
                | (Self::Pending, Self::Cancelled)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Expired)
                | (Self::Open, Self::PartiallyFilled)
                | (Self::Open, Self::Filled)
                | (Self::Open, Self::Cancelled)
                | (Self::Open, Self::Expired)
                | (Self::PartiallyFilled, Self::Open)
                | (Self::PartiallyFilled, Self::Filled)
                | (Self::PartiallyFilled, Self::Cancelled)
                | (Self::PartiallyFilled, Self::Expired)
        )
    }

    /// Returns the valid next states from this state.
    #[must_use]
    pub fn valid_transitions(&self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Returns every state from which `target` may be entered.
    ///
    /// Stores use this to guard a status write in a single statement.
    #[must_use]
    pub fn predecessors(target: Self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(target))
            .collect()
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "OPEN" => Ok(Self::Open),
            "PARTIALLY_FILLED" => Ok(Self::PartiallyFilled),
            "FILLED" => Ok(Self::Filled),
            "CANCELLED" => Ok(Self::Cancelled),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(ParseEnumError::InvalidValue("OrderStatus", s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        for status in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            assert!(status.valid_transitions().is_empty(), "{status}");
        }
    }

    #[test]
    fn partial_fill_loops_back_to_open() {
        assert!(OrderStatus::Open.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Open));
    }

    #[test]
    fn only_pending_can_be_rejected() {
        assert_eq!(
            OrderStatus::predecessors(OrderStatus::Rejected),
            vec![OrderStatus::Pending]
        );
    }

    #[test]
    fn pending_order_can_be_filled_directly() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Filled));
        assert_eq!(
            OrderStatus::predecessors(OrderStatus::Filled),
            vec![
                OrderStatus::Pending,
                OrderStatus::Open,
                OrderStatus::PartiallyFilled
            ]
        );
    }

    #[test]
    fn fill_status_is_always_reachable() {
        for status in OrderStatus::ALL.into_iter().filter(OrderStatus::is_active) {
            for target in [OrderStatus::PartiallyFilled, OrderStatus::Filled] {
                assert!(
                    status == target || status.can_transition_to(target),
                    "{status} -> {target}"
                );
            }
        }
    }

    #[test]
    fn every_active_state_can_expire_and_cancel() {
        for status in OrderStatus::ALL.into_iter().filter(OrderStatus::is_active) {
            assert!(status.can_transition_to(OrderStatus::Expired));
            assert!(status.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn no_self_transitions() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn wire_names_roundtrip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
