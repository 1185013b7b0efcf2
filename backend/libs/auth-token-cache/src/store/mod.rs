//! Key-value store port used by the token cache
//!
//! Single-key string operations plus set operations on a collection key.
//! Every command is atomic per key; nothing here spans keys.

use crate::error::StoreResult;
use async_trait::async_trait;
use std::time::Duration;

mod memory;
mod redis_store;

pub use self::memory::InMemoryKeyValueStore;
pub use self::redis_store::RedisKeyValueStore;

/// Deadline for a single Redis command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// Remaining lifetime of a key as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (or has already expired)
    Missing,
    /// Key exists without an expiry
    Persistent,
    /// Key expires in this many seconds
    Expires(u64),
}

impl KeyTtl {
    /// Decode a Redis `TTL` reply: `-2` missing, `-1` no expiry
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            r if r < 0 => KeyTtl::Persistent,
            r => KeyTtl::Expires(r as u64),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value`, replacing any previous value and expiry. `None` stores
    /// the key without an expiry.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> StoreResult<()>;

    /// Like [`KeyValueStore::set`], but only when the key already exists.
    /// Returns `false` when the key was missing and nothing was written.
    async fn set_if_exists(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Set the expiry of an existing key. No-op when the key is missing.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_reply_decoding() {
        assert_eq!(KeyTtl::from_reply(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_reply(-1), KeyTtl::Persistent);
        assert_eq!(KeyTtl::from_reply(0), KeyTtl::Expires(0));
        assert_eq!(KeyTtl::from_reply(3600), KeyTtl::Expires(3600));
    }
}
