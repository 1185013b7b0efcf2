use super::{KeyTtl, KeyValueStore};
use crate::error::{StoreError, StoreResult};
use crate::timeout::with_timeout;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue};
use std::time::Duration;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed [`KeyValueStore`].
///
/// Every command runs with `command_timeout`; an elapsed deadline is
/// reported as [`StoreError::Timeout`] and handled like any other store
/// failure by the caller.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
    command_timeout: Duration,
}

impl RedisKeyValueStore {
    /// Connect to Redis and build a store around a fresh connection manager
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = with_timeout(
            CONNECT_TIMEOUT,
            ConnectionManager::new(client),
            StoreError::Timeout,
        )
        .await?;

        info!(
            command_timeout_ms = command_timeout.as_millis() as u64,
            "Redis key-value store connected"
        );

        Ok(Self::new(conn, command_timeout))
    }

    pub fn new(conn: ConnectionManager, command_timeout: Duration) -> Self {
        Self {
            conn,
            command_timeout,
        }
    }

    async fn query<T: FromRedisValue>(&self, cmd: redis::Cmd) -> StoreResult<T> {
        let mut conn = self.conn.clone();
        with_timeout(
            self.command_timeout,
            async move { cmd.query_async::<_, T>(&mut conn).await },
            StoreError::Timeout,
        )
        .await
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        self.query(cmd).await
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> StoreResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("XX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        // Nil reply when XX finds no key
        let reply: Option<String> = self.query(cmd).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        self.query(cmd).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(member);
        self.query(cmd).await
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        let reply: i64 = self.query(cmd).await?;
        Ok(KeyTtl::from_reply(reply))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl_secs);
        self.query(cmd).await
    }
}
