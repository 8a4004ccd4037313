//! # Account
//!
//! A user's trading account. Created on onboarding, then mutated only by
//! status and KYC transitions. Deletion is an administrative operation.

use crate::domain::errors::{DomainResult, require_id};
use crate::domain::value_objects::timestamp;
use crate::domain::value_objects::{AccountStatus, AccountType, KycStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trading account.
///
/// # Examples
///
/// ```
/// use exchange_data_adapter::domain::entities::Account;
/// use exchange_data_adapter::domain::value_objects::{AccountStatus, AccountType, KycStatus};
///
/// let account = Account::new("acc-1", "user-1", AccountType::Spot);
/// assert_eq!(account.status, AccountStatus::Active);
/// assert_eq!(account.kyc_status, KycStatus::Pending);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub account_id: String,
    /// Owning user.
    pub user_id: String,
    /// Account type.
    pub account_type: AccountType,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// KYC verification status.
    pub kyc_status: KycStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Opaque metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Account {
    /// Creates an active account awaiting KYC.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        account_type: AccountType,
    ) -> Self {
        let now = timestamp::now();
        Self {
            account_id: account_id.into(),
            user_id: user_id.into(),
            account_type,
            status: AccountStatus::Active,
            kyc_status: KycStatus::Pending,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Sets the metadata blob.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the KYC status.
    #[must_use]
    pub fn with_kyc_status(mut self, kyc_status: KycStatus) -> Self {
        self.kyc_status = kyc_status;
        self
    }

    /// Checks identifiers before the account is stored.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidIdentifier` if an id is blank.
    pub fn validate(&self) -> DomainResult<()> {
        require_id("account_id", &self.account_id)?;
        require_id("user_id", &self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_defaults() {
        let account = Account::new("acc-1", "user-1", AccountType::Margin);
        assert_eq!(account.account_type, AccountType::Margin);
        assert_eq!(account.created_at, account.updated_at);
        assert!(account.metadata.is_none());
        assert!(account.validate().is_ok());
    }

    #[test]
    fn blank_user_is_invalid() {
        let account = Account::new("acc-1", "", AccountType::Spot);
        assert!(account.validate().is_err());
    }
}
