//! # PostgreSQL Account Repository
//!
//! PostgreSQL implementation of [`AccountRepository`] over the tenant's
//! `accounts` table.

use crate::domain::entities::Account;
use crate::domain::queries::AccountQuery;
use crate::domain::value_objects::timestamp;
use crate::domain::value_objects::{AccountStatus, KycStatus};
use crate::infrastructure::persistence::postgres::{
    Conditions, PostgresDatabase, parse_column, push_page,
};
use crate::infrastructure::persistence::traits::{
    AccountRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::Span;

const ENTITY: &str = "Account";
const COLUMNS: &str =
    "account_id, user_id, account_type, status, kyc_status, created_at, updated_at, metadata";

/// PostgreSQL implementation of [`AccountRepository`].
#[derive(Debug, Clone)]
pub struct PostgresAccountRepository {
    pool: PgPool,
    table: String,
    span: Span,
}

impl PostgresAccountRepository {
    /// Creates a repository bound to the database's tenant schema.
    #[must_use]
    pub fn new(db: &PostgresDatabase) -> Self {
        Self {
            pool: db.pool().clone(),
            table: db.table("accounts"),
            span: db.span().clone(),
        }
    }

    async fn set_column(
        &self,
        account_id: &str,
        column: &'static str,
        value: &str,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET {column} = $2, updated_at = $3 WHERE account_id = $1",
            self.table
        ))
        .bind(account_id)
        .bind(value)
        .bind(timestamp::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, account_id))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, account_id));
        }
        tracing::debug!(parent: &self.span, account_id, column, value, "account updated");
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> RepositoryResult<()> {
        account.validate()?;
        sqlx::query(&format!(
            r#"
            INSERT INTO {} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            self.table
        ))
        .bind(&account.account_id)
        .bind(&account.user_id)
        .bind(account.account_type.as_str())
        .bind(account.status.as_str())
        .bind(account.kyc_status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(&account.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, &account.account_id))?;

        tracing::debug!(parent: &self.span, account_id = %account.account_id, "account created");
        Ok(())
    }

    async fn get_by_id(&self, account_id: &str) -> RepositoryResult<Account> {
        let row: AccountRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM {} WHERE account_id = $1",
            self.table
        ))
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, account_id))?;

        row.try_into_account()
    }

    async fn get_by_user_id(&self, user_id: &str) -> RepositoryResult<Vec<Account>> {
        self.query(&AccountQuery::new().with_user(user_id)).await
    }

    async fn query(&self, query: &AccountQuery) -> RepositoryResult<Vec<Account>> {
        let (column, order) = query.ordering()?;
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        let mut conditions = Conditions::new();
        if let Some(user_id) = &query.user_id {
            conditions.next(&mut builder).push("user_id = ").push_bind(user_id);
        }
        if let Some(account_type) = query.account_type {
            conditions
                .next(&mut builder)
                .push("account_type = ")
                .push_bind(account_type.as_str());
        }
        if let Some(status) = query.status {
            conditions.next(&mut builder).push("status = ").push_bind(status.as_str());
        }
        if let Some(kyc_status) = query.kyc_status {
            conditions
                .next(&mut builder)
                .push("kyc_status = ")
                .push_bind(kyc_status.as_str());
        }
        if let Some(after) = query.created_after {
            conditions.next(&mut builder).push("created_at > ").push_bind(after);
        }
        push_page(&mut builder, &query.page, column, order, "account_id");

        let rows: Vec<AccountRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, "query"))?;

        rows.into_iter().map(AccountRow::try_into_account).collect()
    }

    async fn update(&self, account: &Account) -> RepositoryResult<()> {
        account.validate()?;
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET user_id = $2, account_type = $3, status = $4, kyc_status = $5,
                metadata = $6, updated_at = $7
            WHERE account_id = $1
            "#,
            self.table
        ))
        .bind(&account.account_id)
        .bind(&account.user_id)
        .bind(account.account_type.as_str())
        .bind(account.status.as_str())
        .bind(account.kyc_status.as_str())
        .bind(&account.metadata)
        .bind(timestamp::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, &account.account_id))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, &account.account_id));
        }
        Ok(())
    }

    async fn update_status(&self, account_id: &str, status: AccountStatus) -> RepositoryResult<()> {
        self.set_column(account_id, "status", status.as_str()).await
    }

    async fn update_kyc_status(
        &self,
        account_id: &str,
        kyc_status: KycStatus,
    ) -> RepositoryResult<()> {
        self.set_column(account_id, "kyc_status", kyc_status.as_str())
            .await
    }

    async fn delete(&self, account_id: &str) -> RepositoryResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE account_id = $1", self.table))
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(e, ENTITY, account_id))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, account_id));
        }
        tracing::info!(parent: &self.span, account_id, "account deleted");
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    user_id: String,
    account_type: String,
    status: String,
    kyc_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

impl AccountRow {
    fn try_into_account(self) -> RepositoryResult<Account> {
        Ok(Account {
            account_type: parse_column("account_type", &self.account_type)?,
            status: parse_column("status", &self.status)?,
            kyc_status: parse_column("kyc_status", &self.kyc_status)?,
            account_id: self.account_id,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            metadata: self.metadata,
        })
    }
}
