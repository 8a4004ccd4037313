//! # In-Memory Trade Repository
//!
//! In-memory implementation of [`TradeRepository`] for testing.

use crate::domain::entities::Trade;
use crate::domain::queries::TradeQuery;
use crate::infrastructure::persistence::traits::{
    RepositoryError, RepositoryResult, TradeRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

const ENTITY: &str = "Trade";

/// In-memory implementation of [`TradeRepository`].
///
/// Append-only: there is no update or delete path.
#[derive(Debug, Clone)]
pub struct InMemoryTradeRepository {
    storage: Arc<RwLock<HashMap<String, Trade>>>,
}

impl InMemoryTradeRepository {
    /// Creates a new empty in-memory trade repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of trades in the repository.
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

    /// Clears all trades from the repository.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
    }
}

impl Default for InMemoryTradeRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn create(&self, trade: &Trade) -> RepositoryResult<()> {
        trade.validate()?;
        let mut storage = self.storage.write().await;
        match storage.entry(trade.trade_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::conflict(ENTITY, &trade.trade_id)),
            Entry::Vacant(slot) => {
                slot.insert(trade.clone());
                Ok(())
            }
        }
    }

    async fn get_by_id(&self, trade_id: &str) -> RepositoryResult<Trade> {
        let storage = self.storage.read().await;
        storage
            .get(trade_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(ENTITY, trade_id))
    }

    async fn get_by_order_id(&self, order_id: &str) -> RepositoryResult<Vec<Trade>> {
        self.query(&TradeQuery::new().with_order(order_id)).await
    }

    async fn query(&self, query: &TradeQuery) -> RepositoryResult<Vec<Trade>> {
        let (column, order) = query.ordering()?;
        let storage = self.storage.read().await;
        let matching: Vec<Trade> = storage
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        Ok(query.page.window(matching, column, order))
    }

    async fn get_by_symbol(&self, symbol: &str, limit: u32) -> RepositoryResult<Vec<Trade>> {
        self.query(&TradeQuery::new().with_symbol(symbol).with_limit(limit))
            .await
    }

    async fn get_by_account(&self, account_id: &str) -> RepositoryResult<Vec<Trade>> {
        self.query(&TradeQuery::new().with_account(account_id)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::OrderSide;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn create_test_trade(id: &str, order: &str, minutes_ago: i64) -> Trade {
        Trade::new(
            id,
            order,
            "acc-1",
            "BTC-USDT",
            OrderSide::Buy,
            Decimal::ONE,
            Decimal::new(50_000, 0),
        )
        .with_fee(Decimal::new(5, 2), "USDT")
        .with_executed_at(Utc::now() - Duration::minutes(minutes_ago))
    }

    #[tokio::test]
    async fn create_and_get() {
        let repo = InMemoryTradeRepository::new();
        let trade = create_test_trade("t-1", "o-1", 0);
        repo.create(&trade).await.unwrap();
        assert_eq!(repo.get_by_id("t-1").await.unwrap(), trade);
    }

    #[tokio::test]
    async fn trades_are_append_only() {
        let repo = InMemoryTradeRepository::new();
        repo.create(&create_test_trade("t-1", "o-1", 0))
            .await
            .unwrap();
        let err = repo
            .create(&create_test_trade("t-1", "o-2", 0))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.get_by_id("t-1").await.unwrap().order_id, "o-1");
    }

    #[tokio::test]
    async fn order_fills_newest_first() {
        let repo = InMemoryTradeRepository::new();
        repo.create(&create_test_trade("t-1", "o-1", 10))
            .await
            .unwrap();
        repo.create(&create_test_trade("t-2", "o-1", 5))
            .await
            .unwrap();
        repo.create(&create_test_trade("t-3", "o-2", 1))
            .await
            .unwrap();

        let fills = repo.get_by_order_id("o-1").await.unwrap();
        let ids: Vec<_> = fills.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["t-2", "t-1"]);
    }

    #[tokio::test]
    async fn symbol_listing_is_limited() {
        let repo = InMemoryTradeRepository::new();
        for n in 0..5 {
            repo.create(&create_test_trade(&format!("t-{n}"), "o-1", n))
                .await
                .unwrap();
        }
        let recent = repo.get_by_symbol("BTC-USDT", 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["t-0", "t-1"]);
        assert!(repo.get_by_symbol("ETH-USDT", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_trade_is_not_found() {
        let repo = InMemoryTradeRepository::new();
        assert!(repo.get_by_id("nope").await.unwrap_err().is_not_found());
    }
}
