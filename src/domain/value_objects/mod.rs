//! # Value Objects
//!
//! Enumerations, the order lifecycle and timestamp helpers shared by the
//! ledger records.
//!
//! - [`AccountType`], [`AccountStatus`], [`KycStatus`]: account attributes
//! - [`OrderType`], [`OrderSide`], [`TimeInForce`]: order attributes
//! - [`OrderStatus`]: order lifecycle state machine

pub mod enums;
pub mod order_status;
pub mod timestamp;

pub use enums::{
    AccountStatus, AccountType, KycStatus, OrderSide, OrderType, ParseEnumError, TimeInForce,
};
pub use order_status::OrderStatus;
