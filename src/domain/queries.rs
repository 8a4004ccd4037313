//! # Queries
//!
//! Filter, paging and sort criteria for the ledger listings.
//!
//! Every query carries a [`Page`]. Sorting is restricted to a per-record
//! whitelist of columns so that the column name can be spliced into SQL;
//! an unknown column is a validation failure. Without an explicit column
//! the newest records come first.
//!
//! # Examples
//!
//! ```
//! use exchange_data_adapter::domain::queries::{OrderQuery, SortOrder};
//! use exchange_data_adapter::domain::value_objects::OrderStatus;
//!
//! let query = OrderQuery::new()
//!     .with_account("acc-1")
//!     .with_status(OrderStatus::Open)
//!     .with_limit(50)
//!     .sorted_by("quantity", SortOrder::Desc);
//! assert_eq!(query.ordering().unwrap(), ("quantity", SortOrder::Desc));
//! ```

use crate::domain::entities::{Account, Balance, Order, Trade};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{
    AccountStatus, AccountType, KycStatus, OrderSide, OrderStatus, OrderType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// SQL keyword.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Paging and sorting shared by every query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum rows returned; `None` means unbounded.
    pub limit: Option<u32>,
    /// Rows skipped before the first returned one.
    pub offset: u32,
    /// Column to sort by; `None` sorts newest first.
    pub sort_by: Option<String>,
    /// Direction; defaults to ascending for an explicit column.
    pub sort_order: Option<SortOrder>,
}

impl Page {
    /// Resolves the sort column against `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` if the column is not whitelisted.
    pub fn ordering(
        &self,
        allowed: &'static [&'static str],
        newest_first_by: &'static str,
    ) -> DomainResult<(&'static str, SortOrder)> {
        match self.sort_by.as_deref() {
            None => Ok((newest_first_by, self.sort_order.unwrap_or(SortOrder::Desc))),
            Some(requested) => allowed
                .iter()
                .find(|column| column.eq_ignore_ascii_case(requested))
                .map(|column| (*column, self.sort_order.unwrap_or(SortOrder::Asc)))
                .ok_or_else(|| {
                    DomainError::invalid_query(format!(
                        "cannot sort by '{requested}', expected one of: {}",
                        allowed.join(", ")
                    ))
                }),
        }
    }

    /// Sorts and windows an in-process result set the way the SQL
    /// `ORDER BY ... LIMIT ... OFFSET` would.
    pub(crate) fn window<T: Sortable>(&self, mut items: Vec<T>, column: &str, order: SortOrder) -> Vec<T> {
        items.sort_by(|a, b| {
            order
                .apply(a.compare_by(b, column))
                .then_with(|| a.record_id().cmp(b.record_id()))
        });
        let skipped = items.into_iter().skip(self.offset as usize);
        match self.limit {
            Some(limit) => skipped.take(limit as usize).collect(),
            None => skipped.collect(),
        }
    }
}

/// Records that can be ordered by one of their whitelisted columns.
pub(crate) trait Sortable {
    fn compare_by(&self, other: &Self, column: &str) -> Ordering;
    fn record_id(&self) -> &str;
}

macro_rules! paging_builders {
    ($query:ty) => {
        impl $query {
            /// Sets the maximum number of rows.
            #[must_use]
            pub fn with_limit(mut self, limit: u32) -> Self {
                self.page.limit = Some(limit);
                self
            }

            /// Sets the number of rows to skip.
            #[must_use]
            pub fn with_offset(mut self, offset: u32) -> Self {
                self.page.offset = offset;
                self
            }

            /// Sorts by a whitelisted column.
            #[must_use]
            pub fn sorted_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
                self.page.sort_by = Some(column.into());
                self.page.sort_order = Some(order);
                self
            }

            /// Resolved `(column, direction)` for this query.
            ///
            /// # Errors
            ///
            /// Returns `DomainError::InvalidQuery` for a column outside
            /// [`Self::SORT_COLUMNS`].
            pub fn ordering(&self) -> DomainResult<(&'static str, SortOrder)> {
                self.page.ordering(Self::SORT_COLUMNS, Self::DEFAULT_SORT)
            }
        }
    };
}

/// Account listing criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountQuery {
    /// Owning user.
    pub user_id: Option<String>,
    /// Account type.
    pub account_type: Option<AccountType>,
    /// Account status.
    pub status: Option<AccountStatus>,
    /// KYC status.
    pub kyc_status: Option<KycStatus>,
    /// Created strictly after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Paging and sorting.
    pub page: Page,
}

impl AccountQuery {
    /// Sortable columns.
    pub const SORT_COLUMNS: &'static [&'static str] = &[
        "account_id",
        "user_id",
        "account_type",
        "status",
        "kyc_status",
        "created_at",
        "updated_at",
    ];
    /// Column used for newest-first ordering.
    pub const DEFAULT_SORT: &'static str = "created_at";

    /// Matches every account.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restricts to one account type.
    #[must_use]
    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = Some(account_type);
        self
    }

    /// Restricts to one status.
    #[must_use]
    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to one KYC status.
    #[must_use]
    pub fn with_kyc_status(mut self, kyc_status: KycStatus) -> Self {
        self.kyc_status = Some(kyc_status);
        self
    }

    /// Restricts to accounts created after `instant`.
    #[must_use]
    pub fn created_after(mut self, instant: DateTime<Utc>) -> Self {
        self.created_after = Some(instant);
        self
    }

    /// Returns true if `account` satisfies every filter.
    #[must_use]
    pub fn matches(&self, account: &Account) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == account.user_id)
            && self.account_type.is_none_or(|t| t == account.account_type)
            && self.status.is_none_or(|s| s == account.status)
            && self.kyc_status.is_none_or(|k| k == account.kyc_status)
            && self.created_after.is_none_or(|t| account.created_at > t)
    }
}

paging_builders!(AccountQuery);

impl Sortable for Account {
    fn compare_by(&self, other: &Self, column: &str) -> Ordering {
        match column {
            "account_id" => self.account_id.cmp(&other.account_id),
            "user_id" => self.user_id.cmp(&other.user_id),
            "account_type" => self.account_type.as_str().cmp(other.account_type.as_str()),
            "status" => self.status.as_str().cmp(other.status.as_str()),
            "kyc_status" => self.kyc_status.as_str().cmp(other.kyc_status.as_str()),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => self.created_at.cmp(&other.created_at),
        }
    }

    fn record_id(&self) -> &str {
        &self.account_id
    }
}

/// Order listing criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    /// Owning account.
    pub account_id: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Order type.
    pub order_type: Option<OrderType>,
    /// Side.
    pub side: Option<OrderSide>,
    /// Status.
    pub status: Option<OrderStatus>,
    /// Created strictly after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Paging and sorting.
    pub page: Page,
}

impl OrderQuery {
    /// Sortable columns.
    pub const SORT_COLUMNS: &'static [&'static str] = &[
        "order_id",
        "symbol",
        "order_type",
        "side",
        "quantity",
        "price",
        "filled_quantity",
        "status",
        "created_at",
        "updated_at",
    ];
    /// Column used for newest-first ordering.
    pub const DEFAULT_SORT: &'static str = "created_at";

    /// Matches every order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one account.
    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Restricts to one symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Restricts to one order type.
    #[must_use]
    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    /// Restricts to one side.
    #[must_use]
    pub fn with_side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    /// Restricts to one status.
    #[must_use]
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to orders created inside `(after, before)`.
    #[must_use]
    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    /// Returns true if `order` satisfies every filter.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.account_id.as_ref().is_none_or(|a| *a == order.account_id)
            && self.symbol.as_ref().is_none_or(|s| *s == order.symbol)
            && self.order_type.is_none_or(|t| t == order.order_type)
            && self.side.is_none_or(|s| s == order.side)
            && self.status.is_none_or(|s| s == order.status)
            && self.created_after.is_none_or(|t| order.created_at > t)
            && self.created_before.is_none_or(|t| order.created_at < t)
    }
}

paging_builders!(OrderQuery);

impl Sortable for Order {
    fn compare_by(&self, other: &Self, column: &str) -> Ordering {
        match column {
            "order_id" => self.order_id.cmp(&other.order_id),
            "symbol" => self.symbol.cmp(&other.symbol),
            "order_type" => self.order_type.as_str().cmp(other.order_type.as_str()),
            "side" => self.side.as_str().cmp(other.side.as_str()),
            "quantity" => self.quantity.cmp(&other.quantity),
            "price" => self.price.cmp(&other.price),
            "filled_quantity" => self.filled_quantity.cmp(&other.filled_quantity),
            "status" => self.status.as_str().cmp(other.status.as_str()),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => self.created_at.cmp(&other.created_at),
        }
    }

    fn record_id(&self) -> &str {
        &self.order_id
    }
}

/// Trade listing criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeQuery {
    /// Originating order.
    pub order_id: Option<String>,
    /// Charged account.
    pub account_id: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Side.
    pub side: Option<OrderSide>,
    /// Executed strictly after this instant.
    pub executed_after: Option<DateTime<Utc>>,
    /// Executed strictly before this instant.
    pub executed_before: Option<DateTime<Utc>>,
    /// Paging and sorting.
    pub page: Page,
}

impl TradeQuery {
    /// Sortable columns.
    pub const SORT_COLUMNS: &'static [&'static str] = &[
        "trade_id",
        "order_id",
        "symbol",
        "side",
        "quantity",
        "price",
        "fee",
        "executed_at",
    ];
    /// Column used for newest-first ordering.
    pub const DEFAULT_SORT: &'static str = "executed_at";

    /// Matches every trade.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one order.
    #[must_use]
    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Restricts to one account.
    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Restricts to one symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Restricts to one side.
    #[must_use]
    pub fn with_side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    /// Restricts to trades executed inside `(after, before)`.
    #[must_use]
    pub fn executed_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.executed_after = after;
        self.executed_before = before;
        self
    }

    /// Returns true if `trade` satisfies every filter.
    #[must_use]
    pub fn matches(&self, trade: &Trade) -> bool {
        self.order_id.as_ref().is_none_or(|o| *o == trade.order_id)
            && self.account_id.as_ref().is_none_or(|a| *a == trade.account_id)
            && self.symbol.as_ref().is_none_or(|s| *s == trade.symbol)
            && self.side.is_none_or(|s| s == trade.side)
            && self.executed_after.is_none_or(|t| trade.executed_at > t)
            && self.executed_before.is_none_or(|t| trade.executed_at < t)
    }
}

paging_builders!(TradeQuery);

impl Sortable for Trade {
    fn compare_by(&self, other: &Self, column: &str) -> Ordering {
        match column {
            "trade_id" => self.trade_id.cmp(&other.trade_id),
            "order_id" => self.order_id.cmp(&other.order_id),
            "symbol" => self.symbol.cmp(&other.symbol),
            "side" => self.side.as_str().cmp(other.side.as_str()),
            "quantity" => self.quantity.cmp(&other.quantity),
            "price" => self.price.cmp(&other.price),
            "fee" => self.fee.cmp(&other.fee),
            _ => self.executed_at.cmp(&other.executed_at),
        }
    }

    fn record_id(&self) -> &str {
        &self.trade_id
    }
}

/// Balance listing criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceQuery {
    /// Owning account.
    pub account_id: Option<String>,
    /// Asset symbol.
    pub symbol: Option<String>,
    /// Minimum `total_balance`, inclusive.
    pub min_balance: Option<Decimal>,
    /// Updated strictly after this instant.
    pub updated_after: Option<DateTime<Utc>>,
    /// Paging and sorting.
    pub page: Page,
}

impl BalanceQuery {
    /// Sortable columns.
    pub const SORT_COLUMNS: &'static [&'static str] = &[
        "symbol",
        "available_balance",
        "locked_balance",
        "total_balance",
        "last_updated",
    ];
    /// Column used for newest-first ordering.
    pub const DEFAULT_SORT: &'static str = "last_updated";

    /// Matches every balance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one account.
    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Restricts to one symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Restricts to balances whose total is at least `min`.
    #[must_use]
    pub fn with_min_balance(mut self, min: Decimal) -> Self {
        self.min_balance = Some(min);
        self
    }

    /// Restricts to balances updated after `instant`.
    #[must_use]
    pub fn updated_after(mut self, instant: DateTime<Utc>) -> Self {
        self.updated_after = Some(instant);
        self
    }

    /// Returns true if `balance` satisfies every filter.
    #[must_use]
    pub fn matches(&self, balance: &Balance) -> bool {
        self.account_id.as_ref().is_none_or(|a| *a == balance.account_id)
            && self.symbol.as_ref().is_none_or(|s| *s == balance.symbol)
            && self.min_balance.is_none_or(|m| balance.total_balance >= m)
            && self.updated_after.is_none_or(|t| balance.last_updated > t)
    }
}

paging_builders!(BalanceQuery);

impl Sortable for Balance {
    fn compare_by(&self, other: &Self, column: &str) -> Ordering {
        match column {
            "symbol" => self.symbol.cmp(&other.symbol),
            "available_balance" => self.available_balance.cmp(&other.available_balance),
            "locked_balance" => self.locked_balance.cmp(&other.locked_balance),
            "total_balance" => self.total_balance.cmp(&other.total_balance),
            _ => self.last_updated.cmp(&other.last_updated),
        }
    }

    fn record_id(&self) -> &str {
        &self.balance_id
    }
}
