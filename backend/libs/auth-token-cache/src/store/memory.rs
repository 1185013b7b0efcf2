use super::{KeyTtl, KeyValueStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Process-local [`KeyValueStore`] with Redis-compatible TTL semantics.
///
/// Expiry is driven by `tokio::time`, so tests can move the clock with a
/// paused runtime. Empty sets are removed like Redis does.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have not expired
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                Value::Set(_) => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> StoreResult<()> {
        let expires_at = ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> StoreResult<bool> {
        self.purge_expired(key);
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        entry.value = Value::Str(value.to_string());
        entry.expires_at = ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        self.purge_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Value::Str(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        self.purge_expired(key);
        let now_empty = match self.entries.get_mut(key) {
            None => return Ok(()),
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => {
                    members.remove(member);
                    members.is_empty()
                }
                Value::Str(_) => return Err(StoreError::WrongType(key.to_string())),
            },
        };

        if now_empty {
            self.entries
                .remove_if(key, |_, entry| matches!(&entry.value, Value::Set(m) if m.is_empty()));
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                Value::Str(_) => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.purge_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(KeyTtl::Missing);
        };

        Ok(match entry.expires_at {
            None => KeyTtl::Persistent,
            Some(at) => {
                // Rounded to the nearest second, as Redis reports it
                let remaining = at.saturating_duration_since(Instant::now());
                KeyTtl::Expires(((remaining.as_millis() + 500) / 1000) as u64)
            }
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        self.purge_expired(key);
        if ttl_secs == 0 {
            self.entries.remove(key);
            return Ok(());
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }
}
