//! # Domain Layer
//!
//! Records, value objects and listing criteria, independent of any store.

pub mod entities;
pub mod errors;
pub mod queries;
pub mod value_objects;

pub use errors::{DomainError, DomainResult};
