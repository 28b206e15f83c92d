//! Shared counter store client.
//!
//! Wraps a Redis connection behind the two primitives the pipeline needs:
//! increment-with-expiry (rate limiting) and set-if-not-exists-with-expiry
//! (idempotency). Every round trip is bounded by the configured I/O timeout
//! so a slow store can never stall a request; callers treat any error here
//! as a signal to fall back to their local algorithm.

use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use thiserror::Error;

/// Error types for shared store operations.
///
/// These errors never surface to request handling; the distributed rate
/// limiter and idempotency store consume them and degrade to their local
/// algorithms.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not establish or reuse a connection
    #[error("shared store connection failed: {0}")]
    Connection(String),

    /// A command round trip failed
    #[error("shared store command failed: {0}")]
    Command(String),

    /// The bounded I/O window elapsed before the store replied
    #[error("shared store timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of an increment-with-expiry call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedCount {
    /// Counter value after the increment.
    pub count: i64,
    /// Remaining lifetime of the counter's window.
    pub ttl: Duration,
}

/// Connection to the shared counter store.
///
/// Cloning is cheap; the underlying connection manager multiplexes over a
/// single reconnecting connection.
#[derive(Clone)]
pub struct SharedStore {
    conn: ConnectionManager,
    io_timeout: Duration,
}

impl SharedStore {
    /// Connects to the store at `url`, bounding the handshake by
    /// `io_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the URL is invalid or the connection cannot
    /// be established within the timeout.
    pub async fn connect(url: &str, io_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = tokio::time::timeout(io_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout(io_timeout))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { conn, io_timeout })
    }

    /// Atomically increments `key`, assigning the window TTL on first
    /// increment, and reports the counter value plus remaining window.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unreachable or slow.
    pub async fn incr_with_ttl(&self, key: &str, window: Duration) -> Result<SharedCount, StoreError> {
        let mut conn = self.conn.clone();

        let op = async {
            let count: i64 = conn.incr(key, 1).await?;

            if count == 1 {
                let _: bool = conn
                    .pexpire(key, i64::try_from(window.as_millis()).unwrap_or(i64::MAX))
                    .await?;
                return Ok(SharedCount { count, ttl: window });
            }

            let ttl_ms: i64 = conn.pttl(key).await?;
            // A counter that lost its TTL (e.g. manual tampering) is treated
            // as a fresh window rather than an immortal one.
            let ttl = if ttl_ms > 0 {
                Duration::from_millis(ttl_ms.unsigned_abs())
            } else {
                window
            };
            Ok(SharedCount { count, ttl })
        };

        self.bounded(op).await
    }

    /// Atomically records `key` unless it already exists, with `ttl` as its
    /// lifetime. Returns `true` when the key was newly set.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unreachable or slow.
    pub async fn set_nx_with_ttl(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let op = async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(1)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;

            Ok(reply.is_some())
        };

        self.bounded(op).await
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.io_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.io_timeout))?
            .map_err(|e| StoreError::Command(e.to_string()))
    }
}
