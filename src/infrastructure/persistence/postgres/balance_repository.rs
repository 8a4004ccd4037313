//! # PostgreSQL Balance Repository
//!
//! PostgreSQL implementation of [`BalanceRepository`].
//!
//! `apply_delta` is one `UPDATE` whose right-hand sides read the current
//! row, so the row lock Postgres takes for the update serializes concurrent
//! deltas on the same `(account_id, symbol)` and no increment is lost.
//! `total_balance` is always recomputed from the two components inside the
//! same statement.

use crate::domain::entities::Balance;
use crate::domain::queries::{BalanceQuery, SortOrder};
use crate::domain::value_objects::timestamp;
use crate::infrastructure::persistence::postgres::{Conditions, PostgresDatabase, push_page};
use crate::infrastructure::persistence::traits::{
    BalanceRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::Span;

const ENTITY: &str = "Balance";
const COLUMNS: &str = "balance_id, account_id, symbol, available_balance, locked_balance, \
     total_balance, last_updated, metadata";

/// PostgreSQL implementation of [`BalanceRepository`].
#[derive(Debug, Clone)]
pub struct PostgresBalanceRepository {
    pool: PgPool,
    table: String,
    span: Span,
}

impl PostgresBalanceRepository {
    /// Creates a repository bound to the database's tenant schema.
    #[must_use]
    pub fn new(db: &PostgresDatabase) -> Self {
        Self {
            pool: db.pool().clone(),
            table: db.table("balances"),
            span: db.span().clone(),
        }
    }
}

#[async_trait]
impl BalanceRepository for PostgresBalanceRepository {
    async fn upsert(&self, balance: &Balance) -> RepositoryResult<()> {
        balance.validate()?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $4 + $5, $6, $7)
            ON CONFLICT (account_id, symbol) DO UPDATE
            SET available_balance = EXCLUDED.available_balance,
                locked_balance = EXCLUDED.locked_balance,
                total_balance = EXCLUDED.total_balance,
                last_updated = EXCLUDED.last_updated,
                metadata = EXCLUDED.metadata
            "#,
            self.table
        ))
        .bind(&balance.balance_id)
        .bind(&balance.account_id)
        .bind(&balance.symbol)
        .bind(balance.available_balance)
        .bind(balance.locked_balance)
        .bind(timestamp::now())
        .bind(&balance.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_sqlx(
                e,
                ENTITY,
                &format!("{}/{}", balance.account_id, balance.symbol),
            )
        })?;
        Ok(())
    }

    async fn get_by_id(&self, balance_id: &str) -> RepositoryResult<Balance> {
        let row: BalanceRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM {} WHERE balance_id = $1",
            self.table
        ))
        .bind(balance_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, balance_id))?;

        Ok(row.into())
    }

    async fn get_by_account_and_symbol(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> RepositoryResult<Balance> {
        let row: BalanceRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM {} WHERE account_id = $1 AND symbol = $2",
            self.table
        ))
        .bind(account_id)
        .bind(symbol)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, &format!("{account_id}/{symbol}")))?;

        Ok(row.into())
    }

    async fn query(&self, query: &BalanceQuery) -> RepositoryResult<Vec<Balance>> {
        let (column, order) = query.ordering()?;
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        let mut conditions = Conditions::new();
        if let Some(account_id) = &query.account_id {
            conditions.next(&mut builder).push("account_id = ").push_bind(account_id);
        }
        if let Some(symbol) = &query.symbol {
            conditions.next(&mut builder).push("symbol = ").push_bind(symbol);
        }
        if let Some(min) = query.min_balance {
            conditions.next(&mut builder).push("total_balance >= ").push_bind(min);
        }
        if let Some(after) = query.updated_after {
            conditions.next(&mut builder).push("last_updated > ").push_bind(after);
        }
        push_page(&mut builder, &query.page, column, order, "balance_id");

        let rows: Vec<BalanceRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, "query"))?;

        Ok(rows.into_iter().map(Balance::from).collect())
    }

    async fn get_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Balance>> {
        self.query(
            &BalanceQuery::new()
                .with_account(account_id)
                .sorted_by("symbol", SortOrder::Asc),
        )
        .await
    }

    async fn set_balances(
        &self,
        balance_id: &str,
        available_balance: Decimal,
        locked_balance: Decimal,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET available_balance = $2, locked_balance = $3,
                total_balance = $2 + $3, last_updated = $4
            WHERE balance_id = $1
            "#,
            self.table
        ))
        .bind(balance_id)
        .bind(available_balance)
        .bind(locked_balance)
        .bind(timestamp::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, balance_id))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, balance_id));
        }
        Ok(())
    }

    async fn apply_delta(
        &self,
        account_id: &str,
        symbol: &str,
        available_delta: Decimal,
        locked_delta: Decimal,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET available_balance = available_balance + $3,
                locked_balance = locked_balance + $4,
                total_balance = (available_balance + $3) + (locked_balance + $4),
                last_updated = $5
            WHERE account_id = $1 AND symbol = $2
            "#,
            self.table
        ))
        .bind(account_id)
        .bind(symbol)
        .bind(available_delta)
        .bind(locked_delta)
        .bind(timestamp::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, &format!("{account_id}/{symbol}")))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(
                ENTITY,
                format!("{account_id}/{symbol}"),
            ));
        }
        tracing::trace!(
            parent: &self.span,
            account_id,
            symbol,
            %available_delta,
            %locked_delta,
            "balance delta applied"
        );
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    balance_id: String,
    account_id: String,
    symbol: String,
    available_balance: Decimal,
    locked_balance: Decimal,
    total_balance: Decimal,
    last_updated: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Self {
            balance_id: row.balance_id,
            account_id: row.account_id,
            symbol: row.symbol,
            available_balance: row.available_balance,
            locked_balance: row.locked_balance,
            total_balance: row.total_balance,
            last_updated: row.last_updated,
            metadata: row.metadata,
        }
    }
}
