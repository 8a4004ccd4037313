//! # Redis Connection
//!
//! Owns the auto-reconnecting Redis connection shared by the cache and the
//! service registry.
//!
//! The connection is established lazily on first use or by an explicit
//! [`RedisConnection::connect`]. Every command runs under the configured
//! response timeout.

use crate::infrastructure::config::RedisConfig;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use parking_lot::RwLock;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Cmd, FromRedisValue};
use std::fmt;
use std::time::Duration;
use tracing::Span;

enum ConnectionState {
    Idle,
    Connected(ConnectionManager),
    Closed,
}

/// Shared Redis connection with lifecycle state.
pub struct RedisConnection {
    client: Client,
    max_retries: usize,
    connect_timeout: Duration,
    response_timeout: Duration,
    state: RwLock<ConnectionState>,
    span: Span,
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.read() {
            ConnectionState::Idle => "idle",
            ConnectionState::Connected(_) => "connected",
            ConnectionState::Closed => "closed",
        };
        f.debug_struct("RedisConnection")
            .field("max_retries", &self.max_retries)
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl RedisConnection {
    /// Prepares a client without opening a connection.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the URL is malformed.
    pub fn new(config: &RedisConfig, span: Span) -> RepositoryResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RepositoryError::validation(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            connect_timeout: config.connect_timeout,
            response_timeout: config.response_timeout,
            state: RwLock::new(ConnectionState::Idle),
            span,
        })
    }

    /// Returns true once a connection has been established and not closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.read(), ConnectionState::Connected(_))
    }

    /// Establishes the connection if needed and pings within `deadline`.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Timeout` if the deadline passes
    /// - `RepositoryError::Connection` if Redis is unreachable or the
    ///   connection was closed
    pub async fn connect(&self, deadline: Duration) -> RepositoryResult<()> {
        let connect = async {
            let mut manager = self.manager().await?;
            ping(&mut manager).await
        };
        tokio::time::timeout(deadline, connect)
            .await
            .map_err(|_| RepositoryError::timeout("redis connect", deadline))??;
        tracing::info!(parent: &self.span, "connected to redis");
        Ok(())
    }

    /// Pings an established connection within `deadline`.
    ///
    /// Never opens a connection and never changes the connection state.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Timeout` if the deadline passes
    /// - `RepositoryError::Connection` if Redis is unreachable or not
    ///   connected
    pub async fn health_check(&self, deadline: Duration) -> RepositoryResult<()> {
        let mut manager = match &*self.state.read() {
            ConnectionState::Connected(manager) => manager.clone(),
            ConnectionState::Idle => return Err(RepositoryError::connection("redis not connected")),
            ConnectionState::Closed => return Err(RepositoryError::connection("redis connection closed")),
        };
        tokio::time::timeout(deadline, ping(&mut manager))
            .await
            .map_err(|_| RepositoryError::timeout("redis health check", deadline))?
    }

    /// Drops the connection. Later commands fail with a connection error.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), ConnectionState::Closed);
        if matches!(previous, ConnectionState::Connected(_)) {
            tracing::info!(parent: &self.span, "redis connection closed");
        }
    }

    /// Runs one command under the response timeout.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Timeout` if Redis does not answer in time
    /// - `RepositoryError::Connection` / `RepositoryError::Query` for
    ///   driver failures
    pub async fn run<T: FromRedisValue>(
        &self,
        cmd: &Cmd,
        operation: &'static str,
    ) -> RepositoryResult<T> {
        let mut manager = self.manager().await?;
        match tokio::time::timeout(self.response_timeout, cmd.query_async(&mut manager)).await {
            Ok(result) => result.map_err(|e| {
                tracing::warn!(parent: &self.span, error = %e, operation, "redis command failed");
                RepositoryError::from_redis(e, operation)
            }),
            Err(_) => Err(RepositoryError::timeout(operation, self.response_timeout)),
        }
    }

    async fn manager(&self) -> RepositoryResult<ConnectionManager> {
        match &*self.state.read() {
            ConnectionState::Connected(manager) => return Ok(manager.clone()),
            ConnectionState::Closed => {
                return Err(RepositoryError::connection("redis connection closed"));
            }
            ConnectionState::Idle => {}
        }

        let config = ConnectionManagerConfig::new().set_number_of_retries(self.max_retries);
        let manager = tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new_with_config(self.client.clone(), config),
        )
        .await
        .map_err(|_| RepositoryError::timeout("redis connect", self.connect_timeout))?
        .map_err(|e| RepositoryError::from_redis(e, "redis connect"))?;

        let mut state = self.state.write();
        match &*state {
            ConnectionState::Connected(existing) => Ok(existing.clone()),
            ConnectionState::Closed => Err(RepositoryError::connection("redis connection closed")),
            ConnectionState::Idle => {
                *state = ConnectionState::Connected(manager.clone());
                Ok(manager)
            }
        }
    }
}

async fn ping(manager: &mut ConnectionManager) -> RepositoryResult<()> {
    let reply: String = redis::cmd("PING")
        .query_async(manager)
        .await
        .map_err(|e| RepositoryError::from_redis(e, "ping"))?;
    if reply == "PONG" {
        Ok(())
    } else {
        Err(RepositoryError::connection(format!("unexpected ping reply: {reply}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(url: &str) -> RedisConfig {
        RedisConfig {
            url: url.to_string(),
            max_retries: 0,
            connect_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = RedisConnection::new(&config("not-a-url"), Span::none()).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn health_check_does_not_connect() {
        let conn = RedisConnection::new(&config("redis://127.0.0.1:1"), Span::none()).unwrap();
        let err = conn.health_check(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_connection());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn closed_connection_refuses_commands() {
        let conn = RedisConnection::new(&config("redis://127.0.0.1:1"), Span::none()).unwrap();
        conn.close();
        let err = conn
            .run::<String>(&redis::cmd("PING"), "ping")
            .await
            .unwrap_err();
        assert!(err.is_connection());
        assert!(format!("{conn:?}").contains("closed"));
    }
}
