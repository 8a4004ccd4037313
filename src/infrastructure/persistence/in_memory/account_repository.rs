//! # In-Memory Account Repository
//!
//! In-memory implementation of [`AccountRepository`] for testing.

use crate::domain::entities::Account;
use crate::domain::queries::AccountQuery;
use crate::domain::value_objects::timestamp;
use crate::domain::value_objects::{AccountStatus, KycStatus};
use crate::infrastructure::persistence::traits::{
    AccountRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

const ENTITY: &str = "Account";

/// In-memory implementation of [`AccountRepository`].
#[derive(Debug, Clone)]
pub struct InMemoryAccountRepository {
    storage: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountRepository {
    /// Creates a new empty in-memory account repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of accounts in the repository.
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

    /// Clears all accounts from the repository.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
    }

    async fn modify(
        &self,
        account_id: &str,
        apply: impl FnOnce(&mut Account) + Send,
    ) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        let account = storage
            .get_mut(account_id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, account_id))?;
        apply(account);
        account.updated_at = timestamp::now();
        Ok(())
    }
}

impl Default for InMemoryAccountRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create(&self, account: &Account) -> RepositoryResult<()> {
        account.validate()?;
        let mut storage = self.storage.write().await;
        match storage.entry(account.account_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::conflict(ENTITY, &account.account_id)),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(())
            }
        }
    }

    async fn get_by_id(&self, account_id: &str) -> RepositoryResult<Account> {
        let storage = self.storage.read().await;
        storage
            .get(account_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(ENTITY, account_id))
    }

    async fn get_by_user_id(&self, user_id: &str) -> RepositoryResult<Vec<Account>> {
        self.query(&AccountQuery::new().with_user(user_id)).await
    }

    async fn query(&self, query: &AccountQuery) -> RepositoryResult<Vec<Account>> {
        let (column, order) = query.ordering()?;
        let storage = self.storage.read().await;
        let matching: Vec<Account> = storage
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        Ok(query.page.window(matching, column, order))
    }

    async fn update(&self, account: &Account) -> RepositoryResult<()> {
        account.validate()?;
        let updated = account.clone();
        self.modify(&account.account_id, move |stored| {
            stored.user_id = updated.user_id;
            stored.account_type = updated.account_type;
            stored.status = updated.status;
            stored.kyc_status = updated.kyc_status;
            stored.metadata = updated.metadata;
        })
        .await
    }

    async fn update_status(&self, account_id: &str, status: AccountStatus) -> RepositoryResult<()> {
        self.modify(account_id, |stored| stored.status = status).await
    }

    async fn update_kyc_status(
        &self,
        account_id: &str,
        kyc_status: KycStatus,
    ) -> RepositoryResult<()> {
        self.modify(account_id, |stored| stored.kyc_status = kyc_status)
            .await
    }

    async fn delete(&self, account_id: &str) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        storage
            .remove(account_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(ENTITY, account_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::AccountType;

    fn create_test_account(id: &str, user: &str) -> Account {
        Account::new(id, user, AccountType::Spot)
    }

    #[tokio::test]
    async fn new_repository_is_empty() {
        let repo = InMemoryAccountRepository::new();
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn create_and_get() {
        let repo = InMemoryAccountRepository::new();
        let account = create_test_account("acc-1", "user-1");
        repo.create(&account).await.unwrap();

        let stored = repo.get_by_id("acc-1").await.unwrap();
        assert_eq!(stored, account);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let repo = InMemoryAccountRepository::new();
        repo.create(&create_test_account("acc-1", "user-1"))
            .await
            .unwrap();
        let err = repo
            .create(&create_test_account("acc-1", "user-2"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let repo = InMemoryAccountRepository::new();
        assert!(repo.get_by_id("nope").await.unwrap_err().is_not_found());
        assert!(
            repo.update_status("nope", AccountStatus::Suspended)
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(repo.delete("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn status_and_kyc_updates() {
        let repo = InMemoryAccountRepository::new();
        repo.create(&create_test_account("acc-1", "user-1"))
            .await
            .unwrap();

        repo.update_status("acc-1", AccountStatus::Suspended)
            .await
            .unwrap();
        repo.update_kyc_status("acc-1", KycStatus::Approved)
            .await
            .unwrap();

        let stored = repo.get_by_id("acc-1").await.unwrap();
        assert_eq!(stored.status, AccountStatus::Suspended);
        assert_eq!(stored.kyc_status, KycStatus::Approved);
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn update_keeps_creation_time() {
        let repo = InMemoryAccountRepository::new();
        let account = create_test_account("acc-1", "user-1");
        repo.create(&account).await.unwrap();

        let mut changed = account.clone();
        changed.account_type = AccountType::Futures;
        changed.metadata = Some(serde_json::json!({"tier": 2}));
        repo.update(&changed).await.unwrap();

        let stored = repo.get_by_id("acc-1").await.unwrap();
        assert_eq!(stored.account_type, AccountType::Futures);
        assert_eq!(stored.created_at, account.created_at);
        assert_eq!(stored.metadata, changed.metadata);
    }

    #[tokio::test]
    async fn get_by_user_filters() {
        let repo = InMemoryAccountRepository::new();
        repo.create(&create_test_account("acc-1", "user-1"))
            .await
            .unwrap();
        repo.create(&create_test_account("acc-2", "user-1"))
            .await
            .unwrap();
        repo.create(&create_test_account("acc-3", "user-2"))
            .await
            .unwrap();

        let accounts = repo.get_by_user_id("user-1").await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.user_id == "user-1"));
    }

    #[tokio::test]
    async fn query_rejects_unknown_sort() {
        let repo = InMemoryAccountRepository::new();
        let query = AccountQuery::new().sorted_by("password", crate::domain::queries::SortOrder::Asc);
        assert!(repo.query(&query).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn delete_removes() {
        let repo = InMemoryAccountRepository::new();
        repo.create(&create_test_account("acc-1", "user-1"))
            .await
            .unwrap();
        repo.delete("acc-1").await.unwrap();
        assert!(repo.is_empty());
    }
}
