//! # Domain Entities
//!
//! Ledger records and the service discovery record.
//!
//! ## Ledger
//!
//! - [`Account`]: trading account with status and KYC state
//! - [`Order`]: order with fill progress and lifecycle status
//! - [`Trade`]: append-only execution record
//! - [`Balance`]: per-symbol holdings with a derived total
//!
//! ## Discovery
//!
//! - [`ServiceInfo`]: lease-based registration of a running service

pub mod account;
pub mod balance;
pub mod order;
pub mod service_info;
pub mod trade;

pub use account::Account;
pub use balance::Balance;
pub use order::Order;
pub use service_info::ServiceInfo;
pub use trade::Trade;
