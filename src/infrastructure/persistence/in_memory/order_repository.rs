//! # In-Memory Order Repository
//!
//! In-memory implementation of [`OrderRepository`] for testing.
//!
//! Every mutation runs under one write lock, so the lifecycle checks and
//! the write they guard are atomic just like the single guarded `UPDATE`
//! of the Postgres implementation.

use crate::domain::entities::Order;
use crate::domain::queries::{OrderQuery, SortOrder};
use crate::domain::value_objects::OrderStatus;
use crate::domain::value_objects::timestamp;
use crate::infrastructure::persistence::traits::{
    OrderRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

const ENTITY: &str = "Order";

/// In-memory implementation of [`OrderRepository`].
#[derive(Debug, Clone)]
pub struct InMemoryOrderRepository {
    storage: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty in-memory order repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of orders in the repository.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage
            .try_read()
            .map(|guard| guard.len())
            .unwrap_or(0)
    }

    /// Returns true if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all orders from the repository.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
    }

    async fn newest_first(&self, filter: impl Fn(&Order) -> bool + Send) -> Vec<Order> {
        let storage = self.storage.read().await;
        let mut orders: Vec<Order> = storage.values().filter(|o| filter(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> RepositoryResult<()> {
        order.validate()?;
        let mut storage = self.storage.write().await;
        match storage.entry(order.order_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::conflict(ENTITY, &order.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn get_by_id(&self, order_id: &str) -> RepositoryResult<Order> {
        let storage = self.storage.read().await;
        storage
            .get(order_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(ENTITY, order_id))
    }

    async fn query(&self, query: &OrderQuery) -> RepositoryResult<Vec<Order>> {
        let (column, order) = query.ordering()?;
        let storage = self.storage.read().await;
        let matching: Vec<Order> = storage
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        Ok(query.page.window(matching, column, order))
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        let order = storage
            .get_mut(order_id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, order_id))?;
        if order.status == status && status.is_terminal() {
            return Ok(());
        }
        if order.status != status && !order.status.can_transition_to(status) {
            return Err(RepositoryError::invalid_state(
                ENTITY,
                order_id,
                format!("cannot move from {} to {status}", order.status),
            ));
        }
        if status == OrderStatus::Filled && !order.is_fully_filled() {
            return Err(RepositoryError::invalid_state(
                ENTITY,
                order_id,
                format!(
                    "cannot mark FILLED with {} of {} filled",
                    order.filled_quantity, order.quantity
                ),
            ));
        }
        order.status = status;
        order.updated_at = timestamp::now();
        Ok(())
    }

    async fn update_filled(
        &self,
        order_id: &str,
        filled_quantity: Decimal,
        average_price: Decimal,
    ) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        let order = storage
            .get_mut(order_id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, order_id))?;
        if order.status.is_terminal() {
            return Err(RepositoryError::invalid_state(
                ENTITY,
                order_id,
                format!("{} orders accept no fills", order.status),
            ));
        }
        order.check_fill(filled_quantity, average_price)?;

        let now = timestamp::now();
        order.filled_quantity = filled_quantity;
        order.average_price = Some(average_price);
        order.filled_at = Some(now);
        order.updated_at = now;
        Ok(())
    }

    async fn cancel(&self, order_id: &str) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        let order = storage
            .get_mut(order_id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, order_id))?;
        if order.status.is_terminal() && order.status != OrderStatus::Cancelled {
            return Ok(());
        }
        let now = timestamp::now();
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(now);
        order.updated_at = now;
        Ok(())
    }

    async fn get_pending_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Order>> {
        Ok(self
            .newest_first(|o| o.account_id == account_id && o.status.is_active())
            .await)
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
