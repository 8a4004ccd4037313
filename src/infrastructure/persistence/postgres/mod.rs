//! # PostgreSQL Persistence
//!
//! PostgreSQL implementations of the ledger repositories. Every table name is
//! qualified with the tenant schema held by [`PostgresDatabase`].
//!
//! Expected layout per schema (see `sql/schema.sql`):
//!
//! - `accounts`, keyed by `account_id`
//! - `orders`, keyed by `order_id`
//! - `trades`, keyed by `trade_id`
//! - `balances`, keyed by `balance_id`, unique on `(account_id, symbol)`

pub mod account_repository;
pub mod balance_repository;
pub mod database;
pub mod order_repository;
pub mod trade_repository;

pub use account_repository::PostgresAccountRepository;
pub use balance_repository::PostgresBalanceRepository;
pub use database::PostgresDatabase;
pub use order_repository::PostgresOrderRepository;
pub use trade_repository::PostgresTradeRepository;

use crate::domain::queries::{Page, SortOrder};
use crate::domain::value_objects::ParseEnumError;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use sqlx::{Postgres, QueryBuilder};
use std::str::FromStr;

/// Parses a text column into one of the domain enums.
pub(crate) fn parse_column<T>(column: &'static str, value: &str) -> RepositoryResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    value
        .parse()
        .map_err(|e: ParseEnumError| RepositoryError::serialization(format!("column {column}: {e}")))
}

/// Appends `ORDER BY`, `LIMIT` and `OFFSET`.
///
/// `column` must come from a query's sort whitelist. Ties are broken by
/// `id_column` ascending so paging is stable.
pub(crate) fn push_page(
    builder: &mut QueryBuilder<'_, Postgres>,
    page: &Page,
    column: &'static str,
    order: SortOrder,
    id_column: &'static str,
) {
    builder.push(format!(" ORDER BY {column} {order}, {id_column} ASC"));
    if let Some(limit) = page.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    if page.offset > 0 {
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(page.offset));
    }
}

/// Starts a `WHERE` clause on first use and chains `AND` afterwards.
pub(crate) struct Conditions {
    started: bool,
}

impl Conditions {
    pub(crate) fn new() -> Self {
        Self { started: false }
    }

    pub(crate) fn next<'a, 'args>(
        &mut self,
        builder: &'a mut QueryBuilder<'args, Postgres>,
    ) -> &'a mut QueryBuilder<'args, Postgres> {
        builder.push(if self.started { " AND " } else { " WHERE " });
        self.started = true;
        builder
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::OrderStatus;

    #[test]
    fn unknown_enum_text_is_a_serialization_error() {
        let err = parse_column::<OrderStatus>("status", "HALF_DONE").unwrap_err();
        assert!(matches!(err, RepositoryError::Serialization(_)));
        assert_eq!(
            parse_column::<OrderStatus>("status", "OPEN").ok(),
            Some(OrderStatus::Open)
        );
    }

    #[test]
    fn page_clause_is_appended() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM exchange.orders");
        let mut conditions = Conditions::new();
        conditions.next(&mut builder).push("account_id = ").push_bind("acc-1");
        conditions.next(&mut builder).push("symbol = ").push_bind("BTC-USDT");
        let page = Page {
            limit: Some(10),
            offset: 20,
            ..Page::default()
        };
        push_page(&mut builder, &page, "created_at", SortOrder::Desc, "order_id");
        assert_eq!(
            builder.sql(),
            "SELECT * FROM exchange.orders WHERE account_id = $1 AND symbol = $2 \
             ORDER BY created_at DESC, order_id ASC LIMIT $3 OFFSET $4"
        );
    }
}
