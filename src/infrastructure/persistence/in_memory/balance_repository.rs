//! # In-Memory Balance Repository
//!
//! In-memory implementation of [`BalanceRepository`] for testing.
//!
//! Rows are keyed by `(account_id, symbol)`. A delta is applied under the
//! write lock, which plays the role of the row lock the Postgres `UPDATE`
//! takes, so concurrent deltas serialize and none is lost.

use crate::domain::entities::Balance;
use crate::domain::queries::{BalanceQuery, SortOrder};
use crate::infrastructure::persistence::traits::{
    BalanceRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const ENTITY: &str = "Balance";

type BalanceKey = (String, String);

/// In-memory implementation of [`BalanceRepository`].
#[derive(Debug, Clone)]
pub struct InMemoryBalanceRepository {
    storage: Arc<RwLock<HashMap<BalanceKey, Balance>>>,
}

impl InMemoryBalanceRepository {
    /// Creates a new empty in-memory balance repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of balances in the repository.
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

    /// Clears all balances from the repository.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
    }
}

impl Default for InMemoryBalanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn key(account_id: &str, symbol: &str) -> BalanceKey {
    (account_id.to_string(), symbol.to_string())
}

#[async_trait]
impl BalanceRepository for InMemoryBalanceRepository {
    async fn upsert(&self, balance: &Balance) -> RepositoryResult<()> {
        balance.validate()?;
        let mut storage = self.storage.write().await;
        let slot = key(&balance.account_id, &balance.symbol);
        if !storage.contains_key(&slot)
            && storage.values().any(|b| b.balance_id == balance.balance_id)
        {
            return Err(RepositoryError::conflict(ENTITY, &balance.balance_id));
        }
        let row = storage.entry(slot).or_insert_with(|| balance.clone());
        row.set_components(balance.available_balance, balance.locked_balance);
        row.metadata.clone_from(&balance.metadata);
        Ok(())
    }

    async fn get_by_id(&self, balance_id: &str) -> RepositoryResult<Balance> {
        let storage = self.storage.read().await;
        storage
            .values()
            .find(|b| b.balance_id == balance_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(ENTITY, balance_id))
    }

    async fn get_by_account_and_symbol(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> RepositoryResult<Balance> {
        let storage = self.storage.read().await;
        storage
            .get(&key(account_id, symbol))
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(ENTITY, format!("{account_id}/{symbol}")))
    }

    async fn query(&self, query: &BalanceQuery) -> RepositoryResult<Vec<Balance>> {
        let (column, order) = query.ordering()?;
        let storage = self.storage.read().await;
        let matching: Vec<Balance> = storage
            .values()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        Ok(query.page.window(matching, column, order))
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
        let mut storage = self.storage.write().await;
        let row = storage
            .values_mut()
            .find(|b| b.balance_id == balance_id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, balance_id))?;
        row.set_components(available_balance, locked_balance);
        Ok(())
    }

    async fn apply_delta(
        &self,
        account_id: &str,
        symbol: &str,
        available_delta: Decimal,
        locked_delta: Decimal,
    ) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        let row = storage
            .get_mut(&key(account_id, symbol))
            .ok_or_else(|| RepositoryError::not_found(ENTITY, format!("{account_id}/{symbol}")))?;
        row.apply_delta(available_delta, locked_delta);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use proptest::prelude::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    async fn seeded(available: Decimal, locked: Decimal) -> InMemoryBalanceRepository {
        let repo = InMemoryBalanceRepository::new();
        repo.upsert(&Balance::new("acc-1", "USDT", available, locked))
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn upsert_replaces_snapshot_and_keeps_id() {
        let repo = seeded(dec(100), dec(0)).await;
        let original = repo.get_by_account_and_symbol("acc-1", "USDT").await.unwrap();

        repo.upsert(&Balance::new("acc-1", "USDT", dec(70), dec(30)))
            .await
            .unwrap();
        let replaced = repo.get_by_account_and_symbol("acc-1", "USDT").await.unwrap();
        assert_eq!(replaced.balance_id, original.balance_id);
        assert_eq!(replaced.available_balance, dec(70));
        assert_eq!(replaced.total_balance, dec(100));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn upsert_rejects_id_owned_by_another_pair() {
        let repo = seeded(dec(100), dec(0)).await;
        let usdt = repo.get_by_account_and_symbol("acc-1", "USDT").await.unwrap();

        let btc = Balance::new("acc-1", "BTC", dec(1), dec(0)).with_id(usdt.balance_id.clone());
        assert!(repo.upsert(&btc).await.unwrap_err().is_conflict());
        assert_eq!(repo.len(), 1);
        assert_eq!(
            repo.get_by_id(&usdt.balance_id).await.unwrap().symbol,
            "USDT"
        );
    }

    #[tokio::test]
    async fn upsert_rejects_inconsistent_snapshot() {
        let repo = InMemoryBalanceRepository::new();
        let mut balance = Balance::new("acc-1", "USDT", dec(1), dec(1));
        balance.total_balance = dec(5);
        assert!(repo.upsert(&balance).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn delta_on_missing_row_is_not_found() {
        let repo = InMemoryBalanceRepository::new();
        let err = repo
            .apply_delta("acc-1", "BTC", dec(1), dec(0))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn lock_funds_moves_between_components() {
        let repo = seeded(dec(100), dec(0)).await;
        repo.apply_delta("acc-1", "USDT", dec(-40), dec(40))
            .await
            .unwrap();
        let balance = repo.get_by_account_and_symbol("acc-1", "USDT").await.unwrap();
        assert_eq!(balance.available_balance, dec(60));
        assert_eq!(balance.locked_balance, dec(40));
        assert_eq!(balance.total_balance, dec(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deltas_are_not_lost() {
        let repo = seeded(dec(1_000), dec(0)).await;
        let tasks = (0..200).map(|n| {
            let repo = repo.clone();
            tokio::spawn(async move {
                let locked = if n % 2 == 0 { dec(1) } else { dec(-1) };
                repo.apply_delta("acc-1", "USDT", Decimal::new(-5, 1), locked)
                    .await
            })
        });
        for result in join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let balance = repo.get_by_account_and_symbol("acc-1", "USDT").await.unwrap();
        assert_eq!(balance.available_balance, dec(900));
        assert_eq!(balance.locked_balance, dec(0));
        assert_eq!(balance.total_balance, dec(900));
        assert!(balance.is_consistent());
    }

    #[tokio::test]
    async fn set_balances_recomputes_total() {
        let repo = seeded(dec(10), dec(0)).await;
        let id = repo
            .get_by_account_and_symbol("acc-1", "USDT")
            .await
            .unwrap()
            .balance_id;
        repo.set_balances(&id, dec(3), dec(4)).await.unwrap();
        let balance = repo.get_by_id(&id).await.unwrap();
        assert_eq!(balance.total_balance, dec(7));
        assert!(
            repo.set_balances("missing", dec(1), dec(1))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn account_balances_sorted_by_symbol() {
        let repo = InMemoryBalanceRepository::new();
        for symbol in ["USDT", "BTC", "ETH"] {
            repo.upsert(&Balance::new("acc-1", symbol, dec(1), dec(0)))
                .await
                .unwrap();
        }
        repo.upsert(&Balance::new("acc-2", "BTC", dec(1), dec(0)))
            .await
            .unwrap();

        let balances = repo.get_by_account("acc-1").await.unwrap();
        let symbols: Vec<_> = balances.iter().map(|b| b.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "ETH", "USDT"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn deltas_commute(deltas in proptest::collection::vec((-1_000_000i64..1_000_000, -1_000_000i64..1_000_000), 1..40)) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .build()
                .unwrap();
            let (balance, expected_available, expected_locked) = runtime.block_on(async {
                let repo = seeded(dec(0), dec(0)).await;
                let tasks = deltas.iter().map(|(a, l)| {
                    let repo = repo.clone();
                    let (a, l) = (Decimal::new(*a, 4), Decimal::new(*l, 4));
                    tokio::spawn(async move { repo.apply_delta("acc-1", "USDT", a, l).await })
                });
                for result in join_all(tasks).await {
                    result.unwrap().unwrap();
                }
                let expected_available: Decimal = deltas.iter().map(|(a, _)| Decimal::new(*a, 4)).sum();
                let expected_locked: Decimal = deltas.iter().map(|(_, l)| Decimal::new(*l, 4)).sum();
                let balance = repo.get_by_account_and_symbol("acc-1", "USDT").await.unwrap();
                (balance, expected_available, expected_locked)
            });

            prop_assert_eq!(balance.available_balance, expected_available);
            prop_assert_eq!(balance.locked_balance, expected_locked);
            prop_assert_eq!(balance.total_balance, expected_available + expected_locked);
        }
    }
}
