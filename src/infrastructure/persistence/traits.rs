//! # Repository Traits
//!
//! Port definitions for the ledger and the error taxonomy shared by every
//! store in the adapter.
//!
//! Each port has a Postgres implementation scoped to the tenant schema and
//! an in-memory implementation with the same semantics.
//!
//! # Available Repositories
//!
//! - [`AccountRepository`]: trading accounts
//! - [`OrderRepository`]: orders and their lifecycle
//! - [`TradeRepository`]: append-only executions
//! - [`BalanceRepository`]: per-symbol holdings and atomic delta application
//!
//! # Examples
//!
//! ```ignore
//! use exchange_data_adapter::infrastructure::persistence::traits::BalanceRepository;
//!
//! async fn settle(repo: &impl BalanceRepository) {
//!     repo.apply_delta("acc-1", "USDT", dec!(-100), dec!(100)).await?;
//! }
//! ```

use crate::domain::entities::{Account, Balance, Order, Trade};
use crate::domain::errors::DomainError;
use crate::domain::queries::{AccountQuery, BalanceQuery, OrderQuery, TradeQuery};
use crate::domain::value_objects::{AccountStatus, KycStatus, OrderStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity or key not found.
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Malformed input such as a blank identifier or an invalid schema name.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Constraint violation on create.
    #[error("Conflict: {entity_type} with id {id} already exists")]
    Conflict {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Operation not allowed in the entity's current state.
    #[error("Invalid state: {entity_type} {id}: {message}")]
    InvalidState {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
        /// What was refused.
        message: String,
    },

    /// Store unreachable or ping failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation exceeded its deadline.
    #[error("Timeout: {operation} did not complete within {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Deadline.
        after: Duration,
    },

    /// Store not configured for this adapter.
    #[error("Unavailable: {0} is not configured")]
    Unavailable(&'static str),

    /// Query error.
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Several resources failed during one lifecycle call.
    #[error("Partial failure: {}", join_errors(.0))]
    PartialFailure(Vec<RepositoryError>),
}

fn join_errors(errors: &[RepositoryError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RepositoryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(
        entity_type: &'static str,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            entity_type,
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Collapses lifecycle failures: none is `Ok`, one is returned as is,
    /// several become [`RepositoryError::PartialFailure`].
    ///
    /// # Errors
    ///
    /// Returns the aggregated failure when `errors` is not empty.
    pub fn aggregate(mut errors: Vec<RepositoryError>) -> RepositoryResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::PartialFailure(errors)),
        }
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a conflict error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if this is an invalid state error.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns true if the store could not be reached in time.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }

    /// Classifies a sqlx error raised while operating on `entity_type` `id`.
    #[must_use]
    pub fn from_sqlx(err: sqlx::Error, entity_type: &'static str, id: &str) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found(entity_type, id),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::conflict(entity_type, id)
            }
            sqlx::Error::Database(db) if db.is_check_violation() => {
                Self::validation(format!("{entity_type} {id}: {db}"))
            }
            sqlx::Error::PoolTimedOut => Self::connection("timed out acquiring a connection"),
            err @ (sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed) => Self::connection(err.to_string()),
            err @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
                Self::serialization(format!("{entity_type} {id}: {err}"))
            }
            err => Self::query(format!("{entity_type} {id}: {err}")),
        }
    }

    /// Classifies a redis error raised by `operation`.
    #[must_use]
    pub fn from_redis(err: redis::RedisError, operation: &str) -> Self {
        if err.is_timeout() {
            Self::connection(format!("{operation}: timed out: {err}"))
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::connection(format!("{operation}: {err}"))
        } else {
            Self::query(format!("{operation}: {err}"))
        }
    }
}

impl From<DomainError> for RepositoryError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository for trading accounts.
#[async_trait]
pub trait AccountRepository: Send + Sync + fmt::Debug {
    /// Stores a new account.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Validation` if the account is malformed
    /// - `RepositoryError::Conflict` if the id is already taken
    async fn create(&self, account: &Account) -> RepositoryResult<()>;

    /// Gets an account by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such account exists.
    async fn get_by_id(&self, account_id: &str) -> RepositoryResult<Account>;

    /// Lists the accounts owned by a user, newest first.
    async fn get_by_user_id(&self, user_id: &str) -> RepositoryResult<Vec<Account>>;

    /// Lists accounts matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` for an unsupported sort column.
    async fn query(&self, query: &AccountQuery) -> RepositoryResult<Vec<Account>>;

    /// Overwrites the mutable fields of an existing account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such account exists.
    async fn update(&self, account: &Account) -> RepositoryResult<()>;

    /// Sets the account status.
    async fn update_status(&self, account_id: &str, status: AccountStatus) -> RepositoryResult<()>;

    /// Sets the KYC status.
    async fn update_kyc_status(
        &self,
        account_id: &str,
        kyc_status: KycStatus,
    ) -> RepositoryResult<()>;

    /// Removes an account. Administrative only.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such account exists.
    async fn delete(&self, account_id: &str) -> RepositoryResult<()>;
}

/// Repository for orders.
///
/// Status changes follow [`OrderStatus::can_transition_to`] and are checked
/// by the store in the same statement that applies them.
///
/// # Examples
///
/// ```ignore
/// async fn fill(repo: &impl OrderRepository, order: &Order, filled: Decimal, avg: Decimal) {
///     repo.update_filled(&order.order_id, filled, avg).await?;
///     let next = order.status_after_fill(filled);
///     if next != order.status {
///         repo.update_status(&order.order_id, next).await?;
///     }
/// }
/// ```
#[async_trait]
pub trait OrderRepository: Send + Sync + fmt::Debug {
    /// Stores a new order.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Validation` if the order is malformed
    /// - `RepositoryError::Conflict` if the id is already taken
    async fn create(&self, order: &Order) -> RepositoryResult<()>;

    /// Gets an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such order exists.
    async fn get_by_id(&self, order_id: &str) -> RepositoryResult<Order>;

    /// Lists orders matching `query`.
    async fn query(&self, query: &OrderQuery) -> RepositoryResult<Vec<Order>>;

    /// Moves an order to `status`.
    ///
    /// Setting the current status again is accepted. On a terminal order
    /// that is a no-op.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if no such order exists
    /// - `RepositoryError::InvalidState` if the lifecycle forbids the move,
    ///   or if `status` is FILLED while part of the quantity is unfilled
    async fn update_status(&self, order_id: &str, status: OrderStatus) -> RepositoryResult<()>;

    /// Records fill progress without touching the status.
    ///
    /// A value below the current filled quantity is accepted; callers are
    /// expected to report monotonically.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if no such order exists
    /// - `RepositoryError::Validation` if the fill exceeds the order quantity
    /// - `RepositoryError::InvalidState` if the order is terminal
    async fn update_filled(
        &self,
        order_id: &str,
        filled_quantity: Decimal,
        average_price: Decimal,
    ) -> RepositoryResult<()>;

    /// Cancels an order.
    ///
    /// Cancelling a cancelled order stamps it again; cancelling a filled,
    /// rejected or expired order leaves it untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such order exists.
    async fn cancel(&self, order_id: &str) -> RepositoryResult<()>;

    /// Lists the account's pending, open and partially filled orders.
    async fn get_pending_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Order>>;

    /// Lists the account's orders in one symbol, newest first.
    async fn get_by_account_and_symbol(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> RepositoryResult<Vec<Order>>;
}

/// Repository for trades. Trades are never updated or deleted.
#[async_trait]
pub trait TradeRepository: Send + Sync + fmt::Debug {
    /// Appends a trade.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Validation` if the trade is malformed
    /// - `RepositoryError::Conflict` if the id is already taken
    async fn create(&self, trade: &Trade) -> RepositoryResult<()>;

    /// Gets a trade by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such trade exists.
    async fn get_by_id(&self, trade_id: &str) -> RepositoryResult<Trade>;

    /// Lists the fills of one order, newest first.
    async fn get_by_order_id(&self, order_id: &str) -> RepositoryResult<Vec<Trade>>;

    /// Lists trades matching `query`.
    async fn query(&self, query: &TradeQuery) -> RepositoryResult<Vec<Trade>>;

    /// Lists the most recent `limit` trades in a symbol.
    async fn get_by_symbol(&self, symbol: &str, limit: u32) -> RepositoryResult<Vec<Trade>>;

    /// Lists an account's trades, newest first.
    async fn get_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Trade>>;
}

/// Repository for balances.
///
/// `apply_delta` is the only path meant for concurrent mutation. The store
/// evaluates the arithmetic itself so concurrent deltas on one row
/// serialize and commute.
#[async_trait]
pub trait BalanceRepository: Send + Sync + fmt::Debug {
    /// Creates or replaces the snapshot for `(account_id, symbol)`.
    ///
    /// An existing row keeps its `balance_id`.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Validation` if the snapshot is inconsistent
    /// - `RepositoryError::Conflict` if a new pair carries a `balance_id`
    ///   that belongs to another pair
    async fn upsert(&self, balance: &Balance) -> RepositoryResult<()>;

    /// Gets a balance by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such balance exists.
    async fn get_by_id(&self, balance_id: &str) -> RepositoryResult<Balance>;

    /// Gets the balance of one symbol in one account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such balance exists.
    async fn get_by_account_and_symbol(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> RepositoryResult<Balance>;

    /// Lists balances matching `query`.
    async fn query(&self, query: &BalanceQuery) -> RepositoryResult<Vec<Balance>>;

    /// Lists an account's balances ordered by symbol.
    async fn get_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Balance>>;

    /// Overwrites both components of a balance and recomputes the total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such balance exists.
    async fn set_balances(
        &self,
        balance_id: &str,
        available_balance: Decimal,
        locked_balance: Decimal,
    ) -> RepositoryResult<()>;

    /// Adds the deltas to an existing balance in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the balance does not exist;
    /// no row is created.
    async fn apply_delta(
        &self,
        account_id: &str,
        symbol: &str,
        available_delta: Decimal,
        locked_delta: Decimal,
    ) -> RepositoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod repository_error {
        use super::*;

        #[test]
        fn not_found_error() {
            let err = RepositoryError::not_found("Order", "ord-123");
            assert!(err.is_not_found());
            assert!(!err.is_conflict());
            assert!(err.to_string().contains("not found"));
            assert!(err.to_string().contains("Order"));
            assert!(err.to_string().contains("ord-123"));
        }

        #[test]
        fn conflict_error() {
            let err = RepositoryError::conflict("Account", "acc-1");
            assert!(err.is_conflict());
            assert!(!err.is_not_found());
            assert!(err.to_string().contains("already exists"));
        }

        #[test]
        fn timeout_counts_as_connection() {
            let err = RepositoryError::timeout("connect", Duration::from_secs(10));
            assert!(err.is_connection());
            assert!(err.to_string().contains("connect"));
        }

        #[test]
        fn domain_errors_become_validation() {
            let err: RepositoryError = DomainError::invalid_quantity("negative").into();
            assert!(err.is_validation());
        }

        #[test]
        fn aggregate_collapses_by_count() {
            assert!(RepositoryError::aggregate(Vec::new()).is_ok());

            let single = RepositoryError::aggregate(vec![RepositoryError::connection("redis")]);
            assert!(matches!(single, Err(RepositoryError::Connection(_))));

            let many = RepositoryError::aggregate(vec![
                RepositoryError::connection("postgres down"),
                RepositoryError::connection("redis down"),
            ]);
            assert!(matches!(
                many,
                Err(RepositoryError::PartialFailure(ref errors)) if errors.len() == 2
            ));
        }

        #[test]
        fn partial_failure_lists_every_cause() {
            let err = RepositoryError::PartialFailure(vec![
                RepositoryError::connection("postgres down"),
                RepositoryError::Unavailable("redis"),
            ]);
            let text = err.to_string();
            assert!(text.contains("postgres down"));
            assert!(text.contains("redis is not configured"));
        }

        #[test]
        fn row_not_found_maps_to_not_found() {
            let err = RepositoryError::from_sqlx(sqlx::Error::RowNotFound, "Balance", "b-1");
            assert!(err.is_not_found());
        }

        #[test]
        fn pool_closed_maps_to_connection() {
            let err = RepositoryError::from_sqlx(sqlx::Error::PoolClosed, "Order", "o-1");
            assert!(err.is_connection());
        }
    }
}
