//! # PostgreSQL Database
//!
//! Connection pool shared by the Postgres repositories, bound to one
//! tenant schema.
//!
//! The pool is created lazily: no connection is opened until the first
//! query or an explicit [`PostgresDatabase::connect`].

use crate::infrastructure::config::PostgresConfig;
use crate::infrastructure::namespace::TenantNamespace;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use crate::infrastructure::telemetry::component_span;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::Span;

/// Pool plus the schema every table name is qualified with.
///
/// # Examples
///
/// ```ignore
/// let db = PostgresDatabase::new(&config, namespace, span)?;
/// db.connect(Duration::from_secs(10)).await?;
/// let orders = PostgresOrderRepository::new(&db);
/// ```
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    namespace: TenantNamespace,
    span: Span,
}

impl PostgresDatabase {
    /// Builds a lazy pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the URL cannot be parsed or
    /// the schema is not a plain SQL identifier.
    pub fn new(
        config: &PostgresConfig,
        namespace: TenantNamespace,
        span: Span,
    ) -> RepositoryResult<Self> {
        namespace.validate()?;
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| RepositoryError::validation(format!("invalid postgres url: {e}")))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .connect_lazy_with(options);
        Ok(Self {
            pool,
            namespace,
            span,
        })
    }

    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the schema is not a plain
    /// SQL identifier.
    pub fn from_pool(pool: PgPool, namespace: TenantNamespace) -> RepositoryResult<Self> {
        namespace.validate()?;
        let span = component_span("postgres", &namespace);
        Ok(Self {
            pool,
            namespace,
            span,
        })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Tenant namespace.
    #[must_use]
    pub fn namespace(&self) -> &TenantNamespace {
        &self.namespace
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Schema-qualified table name.
    #[must_use]
    pub fn table(&self, table: &str) -> String {
        self.namespace.table(table)
    }

    /// Opens a connection and runs a round trip within `deadline`.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Timeout` if the deadline passes
    /// - `RepositoryError::Connection` if the database is unreachable
    pub async fn connect(&self, deadline: Duration) -> RepositoryResult<()> {
        self.ping("postgres connect", deadline).await?;
        tracing::info!(
            parent: &self.span,
            schema = self.namespace.schema(),
            pool_size = self.pool.size(),
            "connected to postgres"
        );
        Ok(())
    }

    /// Read-only liveness probe.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Timeout` if the deadline passes
    /// - `RepositoryError::Connection` if the database is unreachable
    pub async fn health_check(&self, deadline: Duration) -> RepositoryResult<()> {
        self.ping("postgres health check", deadline).await
    }

    /// Closes every pooled connection, waiting up to `deadline` for
    /// checked-out connections to come back. Later queries fail.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Timeout` if connections are still in use
    /// when the deadline passes; the pool is closed to new work regardless.
    pub async fn close(&self, deadline: Duration) -> RepositoryResult<()> {
        tokio::time::timeout(deadline, self.pool.close())
            .await
            .map_err(|_| RepositoryError::timeout("postgres close", deadline))?;
        tracing::info!(parent: &self.span, "postgres pool closed");
        Ok(())
    }

    /// Returns true once [`PostgresDatabase::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    async fn ping(&self, operation: &'static str, deadline: Duration) -> RepositoryResult<()> {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(deadline, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(parent: &self.span, error = %e, operation, "postgres ping failed");
                Err(RepositoryError::connection(format!("{operation}: {e}")))
            }
            Err(_) => {
                tracing::warn!(parent: &self.span, ?deadline, operation, "postgres ping timed out");
                Err(RepositoryError::timeout(operation, deadline))
            }
        }
    }
}
