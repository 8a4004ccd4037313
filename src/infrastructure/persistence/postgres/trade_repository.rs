//! # PostgreSQL Trade Repository
//!
//! PostgreSQL implementation of [`TradeRepository`]. Trades are insert-only.

use crate::domain::entities::Trade;
use crate::domain::queries::TradeQuery;
use crate::infrastructure::persistence::postgres::{
    Conditions, PostgresDatabase, parse_column, push_page,
};
use crate::infrastructure::persistence::traits::{
    RepositoryError, RepositoryResult, TradeRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::Span;

const ENTITY: &str = "Trade";
const COLUMNS: &str = "trade_id, order_id, account_id, symbol, side, quantity, price, fee, \
     fee_currency, executed_at, metadata";

/// PostgreSQL implementation of [`TradeRepository`].
#[derive(Debug, Clone)]
pub struct PostgresTradeRepository {
    pool: PgPool,
    table: String,
    span: Span,
}

impl PostgresTradeRepository {
    /// Creates a repository bound to the database's tenant schema.
    #[must_use]
    pub fn new(db: &PostgresDatabase) -> Self {
        Self {
            pool: db.pool().clone(),
            table: db.table("trades"),
            span: db.span().clone(),
        }
    }
}

#[async_trait]
impl TradeRepository for PostgresTradeRepository {
    async fn create(&self, trade: &Trade) -> RepositoryResult<()> {
        trade.validate()?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            self.table
        ))
        .bind(&trade.trade_id)
        .bind(&trade.order_id)
        .bind(&trade.account_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(trade.fee)
        .bind(&trade.fee_currency)
        .bind(trade.executed_at)
        .bind(&trade.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, &trade.trade_id))?;

        tracing::debug!(
            parent: &self.span,
            trade_id = %trade.trade_id,
            order_id = %trade.order_id,
            "trade recorded"
        );
        Ok(())
    }

    async fn get_by_id(&self, trade_id: &str) -> RepositoryResult<Trade> {
        let row: TradeRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM {} WHERE trade_id = $1",
            self.table
        ))
        .bind(trade_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, trade_id))?;

        row.try_into_trade()
    }

    async fn get_by_order_id(&self, order_id: &str) -> RepositoryResult<Vec<Trade>> {
        self.query(&TradeQuery::new().with_order(order_id)).await
    }

    async fn query(&self, query: &TradeQuery) -> RepositoryResult<Vec<Trade>> {
        let (column, order) = query.ordering()?;
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        let mut conditions = Conditions::new();
        if let Some(order_id) = &query.order_id {
            conditions.next(&mut builder).push("order_id = ").push_bind(order_id);
        }
        if let Some(account_id) = &query.account_id {
            conditions.next(&mut builder).push("account_id = ").push_bind(account_id);
        }
        if let Some(symbol) = &query.symbol {
            conditions.next(&mut builder).push("symbol = ").push_bind(symbol);
        }
        if let Some(side) = query.side {
            conditions.next(&mut builder).push("side = ").push_bind(side.as_str());
        }
        if let Some(after) = query.executed_after {
            conditions.next(&mut builder).push("executed_at > ").push_bind(after);
        }
        if let Some(before) = query.executed_before {
            conditions.next(&mut builder).push("executed_at < ").push_bind(before);
        }
        push_page(&mut builder, &query.page, column, order, "trade_id");

        let rows: Vec<TradeRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, "query"))?;

        rows.into_iter().map(TradeRow::try_into_trade).collect()
    }

    async fn get_by_symbol(&self, symbol: &str, limit: u32) -> RepositoryResult<Vec<Trade>> {
        self.query(&TradeQuery::new().with_symbol(symbol).with_limit(limit))
            .await
    }

    async fn get_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Trade>> {
        self.query(&TradeQuery::new().with_account(account_id)).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    trade_id: String,
    order_id: String,
    account_id: String,
    symbol: String,
    side: String,
    quantity: Decimal,
    price: Decimal,
    fee: Decimal,
    fee_currency: String,
    executed_at: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

impl TradeRow {
    fn try_into_trade(self) -> RepositoryResult<Trade> {
        Ok(Trade {
            side: parse_column("side", &self.side)?,
            trade_id: self.trade_id,
            order_id: self.order_id,
            account_id: self.account_id,
            symbol: self.symbol,
            quantity: self.quantity,
            price: self.price,
            fee: self.fee,
            fee_currency: self.fee_currency,
            executed_at: self.executed_at,
            metadata: self.metadata,
        })
    }
}
