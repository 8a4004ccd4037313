//! # Tenant Namespace
//!
//! Derives the Postgres schema and the cache key namespace of one exchange
//! instance from its service identity, so that several instances can share
//! one database and one cache cluster without colliding.
//!
//! # Derivation
//!
//! The instance name is split on `-`:
//!
//! | service | instance | schema | namespace |
//! |---|---|---|---|
//! | `exchange-simulator` | `exchange-simulator` | `exchange` | `exchange` |
//! | `exchange-simulator` | `exchange` | `exchange` | `exchange` |
//! | `exchange-simulator` | `exchange-OKX` | `exchange_okx` | `exchange:OKX` |
//! | `exchange-simulator` | `exchange-OKX-Primary` | `exchange_okx` | `exchange:OKX` |
//!
//! Only the first two tokens identify an instance. The schema folds the
//! variant to lowercase while the namespace keeps its case. Explicitly
//! configured values replace the derived ones field by field.
//!
//! # Examples
//!
//! ```
//! use exchange_data_adapter::infrastructure::namespace::TenantNamespace;
//!
//! let ns = TenantNamespace::derive("exchange-simulator", "exchange-OKX");
//! assert_eq!(ns.schema(), "exchange_okx");
//! assert_eq!(ns.cache_namespace(), "exchange:OKX");
//! assert_eq!(ns.cache_key("service:abc"), "exchange:OKX:service:abc");
//! assert_eq!(ns.table("orders"), "exchange_okx.orders");
//! ```

use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use std::fmt;

/// Longest identifier Postgres keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Schema and cache namespace of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantNamespace {
    schema: String,
    cache_namespace: String,
}

impl TenantNamespace {
    /// Uses the given values verbatim.
    #[must_use]
    pub fn new(schema: impl Into<String>, cache_namespace: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            cache_namespace: cache_namespace.into(),
        }
    }

    /// Derives both values from the service identity.
    #[must_use]
    pub fn derive(service_name: &str, instance_name: &str) -> Self {
        let instance_name = if instance_name.is_empty() {
            service_name
        } else {
            instance_name
        };

        let mut tokens = instance_name.split('-');
        let base = tokens.next().unwrap_or_default();
        match tokens.next() {
            Some(variant) if instance_name != service_name => Self {
                schema: format!("{base}_{}", variant.to_lowercase()),
                cache_namespace: format!("{base}:{variant}"),
            },
            _ => {
                let first = service_name.split('-').next().unwrap_or_default();
                Self::new(first, first)
            }
        }
    }

    /// Derives the namespace, letting explicit non-empty values win.
    #[must_use]
    pub fn resolve(
        service_name: &str,
        instance_name: &str,
        explicit_schema: Option<&str>,
        explicit_namespace: Option<&str>,
    ) -> Self {
        let explicit_schema = explicit_schema.filter(|s| !s.is_empty());
        let explicit_namespace = explicit_namespace.filter(|s| !s.is_empty());
        if let (Some(schema), Some(namespace)) = (explicit_schema, explicit_namespace) {
            return Self::new(schema, namespace);
        }

        let derived = Self::derive(service_name, instance_name);
        Self {
            schema: explicit_schema.map_or(derived.schema, str::to_string),
            cache_namespace: explicit_namespace.map_or(derived.cache_namespace, str::to_string),
        }
    }

    /// Postgres schema owning this tenant's tables.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Prefix of this tenant's cache keys.
    #[must_use]
    pub fn cache_namespace(&self) -> &str {
        &self.cache_namespace
    }

    /// Schema-qualified table name.
    #[must_use]
    pub fn table(&self, table: &str) -> String {
        format!("{}.{table}", self.schema)
    }

    /// Namespaced cache key.
    #[must_use]
    pub fn cache_key(&self, key: &str) -> String {
        format!("{}:{key}", self.cache_namespace)
    }

    /// Strips this namespace from a full cache key.
    ///
    /// Returns `None` for keys outside the namespace.
    #[must_use]
    pub fn strip_cache_key<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key
            .strip_prefix(self.cache_namespace.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }

    /// Checks that the schema can be spliced into SQL unquoted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` unless the schema matches
    /// `[A-Za-z_][A-Za-z0-9_]*` and fits in [`MAX_IDENTIFIER_LEN`] bytes,
    /// or if the cache namespace is empty.
    pub fn validate(&self) -> RepositoryResult<()> {
        if !is_sql_identifier(&self.schema) {
            return Err(RepositoryError::validation(format!(
                "schema '{}' is not a valid SQL identifier",
                self.schema
            )));
        }
        if self.cache_namespace.is_empty() {
            return Err(RepositoryError::validation("cache namespace must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for TenantNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema={} namespace={}", self.schema, self.cache_namespace)
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn derived(service: &str, instance: &str) -> (String, String) {
        let ns = TenantNamespace::derive(service, instance);
        (ns.schema().to_string(), ns.cache_namespace().to_string())
    }

    #[test]
    fn singleton_uses_first_service_token() {
        assert_eq!(
            derived("exchange-simulator", "exchange-simulator"),
            ("exchange".into(), "exchange".into())
        );
        assert_eq!(
            derived("exchange-data-adapter", "exchange-data-adapter"),
            ("exchange".into(), "exchange".into())
        );
    }

    #[test]
    fn multi_instance_folds_schema_case_only() {
        assert_eq!(
            derived("exchange-simulator", "exchange-OKX"),
            ("exchange_okx".into(), "exchange:OKX".into())
        );
        assert_eq!(
            derived("exchange-simulator", "exchange-Binance"),
            ("exchange_binance".into(), "exchange:Binance".into())
        );
    }

    #[test]
    fn third_token_is_ignored() {
        assert_eq!(
            derived("exchange-simulator", "exchange-OKX-Primary"),
            ("exchange_okx".into(), "exchange:OKX".into())
        );
    }

    #[test]
    fn single_token_instance_falls_back_to_service() {
        assert_eq!(
            derived("exchange-simulator", "exchange"),
            ("exchange".into(), "exchange".into())
        );
    }

    #[test]
    fn uppercase_singleton_keeps_case() {
        assert_eq!(
            derived("EXCHANGE-SIMULATOR", "EXCHANGE-SIMULATOR"),
            ("EXCHANGE".into(), "EXCHANGE".into())
        );
    }

    #[test]
    fn empty_instance_is_singleton() {
        assert_eq!(derived("exchange-simulator", ""), derived("exchange-simulator", "exchange-simulator"));
    }

    #[test]
    fn explicit_values_win_per_field() {
        let ns = TenantNamespace::resolve("exchange-simulator", "exchange-OKX", Some("custom"), None);
        assert_eq!(ns.schema(), "custom");
        assert_eq!(ns.cache_namespace(), "exchange:OKX");

        let ns = TenantNamespace::resolve("exchange-simulator", "exchange-OKX", Some(""), Some("ns"));
        assert_eq!(ns.schema(), "exchange_okx");
        assert_eq!(ns.cache_namespace(), "ns");
    }

    #[test]
    fn cache_keys_round_trip_through_strip() {
        let ns = TenantNamespace::derive("exchange-simulator", "exchange-OKX");
        let key = ns.cache_key("heartbeat:svc-1");
        assert_eq!(ns.strip_cache_key(&key), Some("heartbeat:svc-1"));
        assert_eq!(ns.strip_cache_key("exchange:OKXother:k"), None);
        assert_eq!(ns.strip_cache_key("exchange:Binance:k"), None);
    }

    #[test]
    fn schema_must_be_plain_identifier() {
        assert!(TenantNamespace::new("exchange_okx", "x").validate().is_ok());
        assert!(TenantNamespace::new("_x1", "x").validate().is_ok());
        assert!(TenantNamespace::new("1abc", "x").validate().is_err());
        assert!(TenantNamespace::new("a.b", "x").validate().is_err());
        assert!(TenantNamespace::new("x; drop", "x").validate().is_err());
        assert!(TenantNamespace::new("", "x").validate().is_err());
        assert!(TenantNamespace::new("a".repeat(64), "x").validate().is_err());
        assert!(TenantNamespace::new("ok", "").validate().is_err());
    }

    proptest! {
        #[test]
        fn derive_is_deterministic(
            service in "[a-z]{1,8}(-[a-z]{1,8}){0,2}",
            instance in "[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8}){0,3}",
        ) {
            let first = TenantNamespace::derive(&service, &instance);
            let second = TenantNamespace::derive(&service, &instance);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.validate().is_ok());
        }

        #[test]
        fn schema_is_lowercase_variant_of_namespace(
            base in "[a-z]{1,8}",
            variant in "[A-Za-z]{1,8}",
            extra in proptest::option::of("[A-Za-z]{1,8}"),
        ) {
            let instance = match &extra {
                Some(extra) => format!("{base}-{variant}-{extra}"),
                None => format!("{base}-{variant}"),
            };
            prop_assume!(instance != "exchange-simulator");
            let ns = TenantNamespace::derive("exchange-simulator", &instance);
            prop_assert_eq!(ns.schema(), format!("{base}_{}", variant.to_lowercase()));
            prop_assert_eq!(ns.cache_namespace(), format!("{base}:{variant}"));
        }
    }
}
