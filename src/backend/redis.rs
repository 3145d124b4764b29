//! Redis implementation of [`RemoteClient`].

use super::remote::{ClientError, ClientResult, RemoteBackend, RemoteClient};
use crate::config::{BackendType, RemoteConfig};
use crate::error::{CacheOperation, Error, Result};
use ::redis::aio::ConnectionManager;
use parking_lot::Mutex;
use std::time::Duration;

/// Number of keys requested per `SCAN` page.
const SCAN_COUNT: usize = 100;

/// Redis client backed by a multiplexed, auto-reconnecting
/// [`ConnectionManager`].
///
/// The manager is cheap to clone; each command clones it out of the slot so
/// no lock is held across an `.await`. `close` empties the slot.
pub struct RedisClient {
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisClient {
    /// Open a connection manager for `url`.
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisClient {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn conn(&self) -> ClientResult<ConnectionManager> {
        self.conn
            .lock()
            .clone()
            .ok_or_else(|| ClientError::from("redis connection is closed"))
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RemoteClient for RedisClient {
    async fn ping(&self) -> ClientResult<()> {
        let mut conn = self.conn()?;
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> ClientResult<()> {
        let mut conn = self.conn()?;
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> ClientResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        Ok(::redis::cmd("DEL").arg(keys).query_async(&mut conn).await?)
    }

    async fn exists(&self, key: &str) -> ClientResult<bool> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?)
    }

    async fn mget(&self, keys: &[String]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("MGET").arg(keys).query_async(&mut conn).await?)
    }

    async fn pipeline_set(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Option<Duration>,
    ) -> ClientResult<()> {
        let mut conn = self.conn()?;
        let mut pipe = ::redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value);
            if let Some(ttl) = ttl {
                pipe.arg("PX").arg(millis(ttl));
            }
            pipe.ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn scan(&self, cursor: u64, pattern: &str) -> ClientResult<(u64, Vec<String>)> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(&mut conn)
            .await?)
    }

    async fn incr_by(&self, key: &str, amount: i64) -> ClientResult<i64> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("INCRBY")
            .arg(key)
            .arg(amount)
            .query_async(&mut conn)
            .await?)
    }

    async fn decr_by(&self, key: &str, amount: i64) -> ClientResult<i64> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("DECRBY")
            .arg(key)
            .arg(amount)
            .query_async(&mut conn)
            .await?)
    }

    async fn ttl(&self, key: &str) -> ClientResult<i64> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("TTL").arg(key).query_async(&mut conn).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> ClientResult<bool> {
        let mut conn = self.conn()?;
        Ok(::redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?)
    }

    async fn close(&self) -> ClientResult<()> {
        // Dropping the last manager clone tears down the connection task.
        self.conn.lock().take();
        Ok(())
    }
}

impl RemoteBackend<RedisClient> {
    /// Connect to the server named by `config.url` and verify it answers.
    ///
    /// # Errors
    /// Returns `ErrorKind::Connection` if the URL is rejected, the connection
    /// cannot be established, or the initial `PING` fails.
    pub async fn connect(config: RemoteConfig) -> Result<Self> {
        let connecting = RedisClient::connect(&config.url);
        let client = match config.timeout() {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| {
                    Error::timeout(
                        format!("connecting to {} timed out", config.url),
                        Some(limit.as_secs_f64()),
                    )
                    .with_backend(&config.name, BackendType::Remote.as_str())
                })?,
            None => connecting.await,
        };

        let client = client.map_err(|e| {
            Error::connection(format!("failed to connect to {}: {}", config.url, e))
                .with_operation(CacheOperation::Health)
                .with_backend(&config.name, BackendType::Remote.as_str())
                .with_source(e)
        })?;

        RemoteBackend::with_client(config, client).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_millis_rounds_up_to_one() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let config = RemoteConfig::new("r", "not-a-url");
        let err = RemoteBackend::connect(config).await.err().expect("bad url must fail");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_connect_fails_fast_when_unreachable() {
        // Port 1 is reserved and never runs a Redis server.
        let config = RemoteConfig::new("r", "redis://127.0.0.1:1/0")
            .with_timeout(Duration::from_secs(5));
        let err = RemoteBackend::connect(config)
            .await
            .err()
            .expect("unreachable server must fail");
        assert!(matches!(err.kind(), ErrorKind::Connection | ErrorKind::Timeout));
    }
}
