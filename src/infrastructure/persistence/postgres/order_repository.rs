//! # PostgreSQL Order Repository
//!
//! PostgreSQL implementation of [`OrderRepository`] over the tenant's
//! `orders` table.
//!
//! Lifecycle writes are single guarded statements: the allowed source states
//! travel with the `UPDATE` as a `status = ANY($n)` predicate, so a racing
//! writer cannot slip an illegal transition in between a read and a write.
//! When the guard matches no row, a follow-up read tells a missing order
//! apart from a rejected transition.

use crate::domain::entities::Order;
use crate::domain::errors::DomainError;
use crate::domain::queries::{OrderQuery, SortOrder};
use crate::domain::value_objects::OrderStatus;
use crate::domain::value_objects::timestamp;
use crate::infrastructure::persistence::postgres::{
    Conditions, PostgresDatabase, parse_column, push_page,
};
use crate::infrastructure::persistence::traits::{
    OrderRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::Span;

const ENTITY: &str = "Order";
const COLUMNS: &str = "order_id, account_id, symbol, order_type, side, quantity, price, \
     filled_quantity, average_price, status, time_in_force, created_at, updated_at, \
     filled_at, cancelled_at, metadata";

fn status_names(statuses: impl IntoIterator<Item = OrderStatus>) -> Vec<String> {
    statuses.into_iter().map(|s| s.as_str().to_string()).collect()
}

fn terminal_statuses() -> Vec<String> {
    status_names(OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal))
}

/// PostgreSQL implementation of [`OrderRepository`].
#[derive(Debug, Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
    table: String,
    span: Span,
}

impl PostgresOrderRepository {
    /// Creates a repository bound to the database's tenant schema.
    #[must_use]
    pub fn new(db: &PostgresDatabase) -> Self {
        Self {
            pool: db.pool().clone(),
            table: db.table("orders"),
            span: db.span().clone(),
        }
    }

    async fn exists(&self, order_id: &str) -> RepositoryResult<bool> {
        sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE order_id = $1)",
            self.table
        ))
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, order_id))
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create(&self, order: &Order) -> RepositoryResult<()> {
        order.validate()?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
            self.table
        ))
        .bind(&order.order_id)
        .bind(&order.account_id)
        .bind(&order.symbol)
        .bind(order.order_type.as_str())
        .bind(order.side.as_str())
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.filled_quantity)
        .bind(order.average_price)
        .bind(order.status.as_str())
        .bind(order.time_in_force.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.filled_at)
        .bind(order.cancelled_at)
        .bind(&order.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, &order.order_id))?;

        tracing::debug!(
            parent: &self.span,
            order_id = %order.order_id,
            account_id = %order.account_id,
            symbol = %order.symbol,
            "order created"
        );
        Ok(())
    }

    async fn get_by_id(&self, order_id: &str) -> RepositoryResult<Order> {
        let row: OrderRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM {} WHERE order_id = $1",
            self.table
        ))
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, order_id))?;

        row.try_into_order()
    }

    async fn query(&self, query: &OrderQuery) -> RepositoryResult<Vec<Order>> {
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
        if let Some(order_type) = query.order_type {
            conditions
                .next(&mut builder)
                .push("order_type = ")
                .push_bind(order_type.as_str());
        }
        if let Some(side) = query.side {
            conditions.next(&mut builder).push("side = ").push_bind(side.as_str());
        }
        if let Some(status) = query.status {
            conditions.next(&mut builder).push("status = ").push_bind(status.as_str());
        }
        if let Some(after) = query.created_after {
            conditions.next(&mut builder).push("created_at > ").push_bind(after);
        }
        if let Some(before) = query.created_before {
            conditions.next(&mut builder).push("created_at < ").push_bind(before);
        }
        push_page(&mut builder, &query.page, column, order, "order_id");

        let rows: Vec<OrderRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, "query"))?;

        rows.into_iter().map(OrderRow::try_into_order).collect()
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> RepositoryResult<()> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET status = $2, updated_at = $3
            WHERE order_id = $1
              AND ((status = $2 AND status <> ALL($5)) OR status = ANY($4))
              AND ($2 <> 'FILLED' OR filled_quantity = quantity)
            "#,
            self.table
        ))
        .bind(order_id)
        .bind(status.as_str())
        .bind(timestamp::now())
        .bind(status_names(OrderStatus::predecessors(status)))
        .bind(terminal_statuses())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, order_id))?;

        if result.rows_affected() == 0 {
            let current = self.get_by_id(order_id).await?;
            if current.status == status && status.is_terminal() {
                return Ok(());
            }
            if status == OrderStatus::Filled && current.status.can_transition_to(status) {
                return Err(RepositoryError::invalid_state(
                    ENTITY,
                    order_id,
                    format!(
                        "cannot mark FILLED with {} of {} filled",
                        current.filled_quantity, current.quantity
                    ),
                ));
            }
            tracing::warn!(
                parent: &self.span,
                order_id,
                from = %current.status,
                to = %status,
                "rejected order status transition"
            );
            return Err(RepositoryError::invalid_state(
                ENTITY,
                order_id,
                format!("cannot move from {} to {status}", current.status),
            ));
        }
        Ok(())
    }

    async fn update_filled(
        &self,
        order_id: &str,
        filled_quantity: Decimal,
        average_price: Decimal,
    ) -> RepositoryResult<()> {
        if filled_quantity < Decimal::ZERO {
            return Err(DomainError::invalid_quantity("filled quantity must not be negative").into());
        }
        if average_price < Decimal::ZERO {
            return Err(DomainError::invalid_price("average price must not be negative").into());
        }

        let now = timestamp::now();
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET filled_quantity = $2, average_price = $3, filled_at = $4, updated_at = $4
            WHERE order_id = $1 AND $2 <= quantity AND status <> ALL($5)
            "#,
            self.table
        ))
        .bind(order_id)
        .bind(filled_quantity)
        .bind(average_price)
        .bind(now)
        .bind(terminal_statuses())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, order_id))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current = self.get_by_id(order_id).await?;
        if current.status.is_terminal() {
            return Err(RepositoryError::invalid_state(
                ENTITY,
                order_id,
                format!("{} orders accept no fills", current.status),
            ));
        }
        current.check_fill(filled_quantity, average_price)?;
        Err(RepositoryError::invalid_state(
            ENTITY,
            order_id,
            "order changed while recording the fill",
        ))
    }

    async fn cancel(&self, order_id: &str) -> RepositoryResult<()> {
        let now = timestamp::now();
        let closed = status_names(
            OrderStatus::ALL
                .into_iter()
                .filter(|s| s.is_terminal() && *s != OrderStatus::Cancelled),
        );
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET status = $2, cancelled_at = $3, updated_at = $3
            WHERE order_id = $1 AND status <> ALL($4)
            "#,
            self.table
        ))
        .bind(order_id)
        .bind(OrderStatus::Cancelled.as_str())
        .bind(now)
        .bind(closed)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, order_id))?;

        if result.rows_affected() == 0 {
            if !self.exists(order_id).await? {
                return Err(RepositoryError::not_found(ENTITY, order_id));
            }
            tracing::debug!(parent: &self.span, order_id, "cancel ignored for closed order");
        }
        Ok(())
    }

    async fn get_pending_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Order>> {
        let active = status_names(OrderStatus::ALL.into_iter().filter(OrderStatus::is_active));
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM {}
            WHERE account_id = $1 AND status = ANY($2)
            ORDER BY created_at DESC, order_id ASC
            "#,
            self.table
        ))
        .bind(account_id)
        .bind(active)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, account_id))?;

        rows.into_iter().map(OrderRow::try_into_order).collect()
    }

    async fn get_by_account_and_symbol(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> RepositoryResult<Vec<Order>> {
        let query = OrderQuery::new()
            .with_account(account_id)
            .with_symbol(symbol)
            .sorted_by("created_at", SortOrder::Desc);
        self.query(&query).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    account_id: String,
    symbol: String,
    order_type: String,
    side: String,
    quantity: Decimal,
    price: Option<Decimal>,
    filled_quantity: Decimal,
    average_price: Option<Decimal>,
    status: String,
    time_in_force: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    filled_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>,
}

impl OrderRow {
    fn try_into_order(self) -> RepositoryResult<Order> {
        Ok(Order {
            order_type: parse_column("order_type", &self.order_type)?,
            side: parse_column("side", &self.side)?,
            status: parse_column("status", &self.status)?,
            time_in_force: parse_column("time_in_force", &self.time_in_force)?,
            order_id: self.order_id,
            account_id: self.account_id,
            symbol: self.symbol,
            quantity: self.quantity,
            price: self.price,
            filled_quantity: self.filled_quantity,
            average_price: self.average_price,
            created_at: self.created_at,
            updated_at: self.updated_at,
            filled_at: self.filled_at,
            cancelled_at: self.cancelled_at,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_guard_lists_closed_states() {
        let names = terminal_statuses();
        assert!(names.contains(&"FILLED".to_string()));
        assert!(names.contains(&"CANCELLED".to_string()));
        assert!(!names.contains(&"OPEN".to_string()));
    }

    #[test]
    fn filled_guard_admits_pending_orders() {
        let names = status_names(OrderStatus::predecessors(OrderStatus::Filled));
        assert!(names.contains(&"PENDING".to_string()));
        assert!(names.contains(&"PARTIALLY_FILLED".to_string()));
        assert!(!names.contains(&"CANCELLED".to_string()));
    }

    #[test]
    fn open_guard_comes_from_predecessors() {
        let names = status_names(OrderStatus::predecessors(OrderStatus::Open));
        assert!(names.contains(&"PENDING".to_string()));
        assert!(!names.contains(&"FILLED".to_string()));
    }
}
