//! Token cache: `jti -> {userId, snapshot}` records plus a per-user index
//!
//! ## Keys
//!
//! - `auth:token:<jti>`: [`TokenRecord`] JSON, TTL = remaining token validity
//! - `auth:user:<userId>:tokens`: set of token ids believed live for the user
//!
//! The record and the index are written independently, without a
//! transaction. A token missing from the index simply escapes bulk
//! revocation until it expires; an index member without a record is pruned
//! the next time the index is walked.
//!
//! ## Failure handling
//!
//! No operation returns a store error. Failures are logged, counted and the
//! operation degrades: writes become no-ops and liveness checks follow the
//! configured [`RevocationFailurePolicy`].

use crate::error::{StoreError, StoreResult};
use crate::keys::TokenCacheKey;
use crate::metrics;
use crate::models::{TokenRecord, UserSnapshot};
use crate::store::{KeyTtl, KeyValueStore};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Answer given by [`TokenCacheService::is_token_active`] when the store
/// cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationFailurePolicy {
    /// Treat the token as active; revocation is not enforced while the
    /// store is down
    #[default]
    Open,
    /// Treat the token as revoked; authentication fails while the store is
    /// down
    Closed,
}

impl FromStr for RevocationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" | "fail_open" => Ok(Self::Open),
            "closed" | "fail-closed" | "fail_closed" => Ok(Self::Closed),
            other => Err(format!(
                "unknown revocation failure policy '{}' (expected 'open' or 'closed')",
                other
            )),
        }
    }
}

/// Owner of all token records and user token indexes in the store
pub struct TokenCacheService {
    store: Arc<dyn KeyValueStore>,
    failure_policy: RevocationFailurePolicy,
}

impl TokenCacheService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            failure_policy: RevocationFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: RevocationFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> RevocationFailurePolicy {
        self.failure_policy
    }

    /// Cache a freshly issued token and register it in the owner's index.
    ///
    /// `ttl` is rounded up to whole seconds. A zero TTL or an empty token id
    /// makes this a no-op: the token stays valid by signature but is not
    /// tracked as active.
    pub async fn store_token(&self, token_id: &str, snapshot: &UserSnapshot, ttl: Duration) {
        if token_id.is_empty() {
            return;
        }

        let ttl_secs = ceil_secs(ttl);
        if ttl_secs == 0 {
            warn!(
                token_id = %token_id,
                "Skipping auth token caching because TTL is missing or invalid"
            );
            return;
        }

        let record = TokenRecord::for_snapshot(snapshot);
        if let Err(e) = self.write_record(token_id, &record, Some(ttl_secs)).await {
            log_store_failure("store_token", &e);
            return;
        }

        if record.user_id.is_empty() {
            warn!(token_id = %token_id, "Cached auth token has no owner; not indexing");
            return;
        }

        if let Err(e) = self
            .register_token_for_user(&record.user_id, token_id, ttl_secs)
            .await
        {
            log_store_failure("register_token", &e);
        }

        debug!(
            token_id = %token_id,
            user_id = %record.user_id,
            ttl_secs,
            "Auth token cached"
        );
    }

    /// Whether a record exists for `token_id`
    pub async fn is_token_active(&self, token_id: &str) -> bool {
        if token_id.is_empty() {
            return false;
        }

        match self.store.get(&TokenCacheKey::token(token_id)).await {
            Ok(cached) => cached.is_some(),
            Err(e) => {
                log_store_failure("is_token_active", &e);
                self.failure_policy == RevocationFailurePolicy::Open
            }
        }
    }

    /// Read back the cached record of a token
    pub async fn get_token(&self, token_id: &str) -> Option<TokenRecord> {
        if token_id.is_empty() {
            return None;
        }

        match self.read_record(token_id).await {
            Ok(record) => record,
            Err(e) => {
                log_store_failure("get_token", &e);
                None
            }
        }
    }

    /// Delete a token record and drop it from its owner's index.
    ///
    /// The owner is taken from the record; `fallback_user_id` is used when
    /// the record is already gone. Invalidating an absent token succeeds.
    pub async fn invalidate_token(&self, token_id: &str, fallback_user_id: Option<&str>) {
        if token_id.is_empty() {
            return;
        }

        if let Err(e) = self.try_invalidate_token(token_id, fallback_user_id).await {
            log_store_failure("invalidate_token", &e);
        }
    }

    /// Rewrite every live token of `snapshot.id` with the new snapshot,
    /// keeping each token's remaining TTL. Index members whose record has
    /// expired are pruned instead of re-created.
    pub async fn update_user_snapshot(&self, snapshot: &UserSnapshot) {
        if snapshot.id.is_empty() {
            return;
        }

        match self.try_update_user_snapshot(snapshot).await {
            Ok((updated, pruned)) => {
                debug!(
                    user_id = %snapshot.id,
                    updated,
                    pruned,
                    "User snapshot propagated to cached tokens"
                );
            }
            Err(e) => log_store_failure("update_user_snapshot", &e),
        }
    }

    /// Invalidate every indexed token of a user, then remove the index.
    ///
    /// The index is kept when any member could not be invalidated, so a
    /// later bulk revocation still reaches the tokens left behind.
    pub async fn invalidate_all_tokens_for_user(&self, user_id: &str) {
        if user_id.is_empty() {
            return;
        }

        match self.try_invalidate_all_tokens_for_user(user_id).await {
            Ok(count) => {
                info!(user_id = %user_id, revoked = count, "All auth tokens revoked for user");
            }
            Err(e) => log_store_failure("invalidate_all_tokens_for_user", &e),
        }
    }

    async fn write_record(
        &self,
        token_id: &str,
        record: &TokenRecord,
        ttl_secs: Option<u64>,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(record)?;
        self.store
            .set(&TokenCacheKey::token(token_id), &payload, ttl_secs)
            .await
    }

    async fn read_record(&self, token_id: &str) -> StoreResult<Option<TokenRecord>> {
        match self.store.get(&TokenCacheKey::token(token_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn register_token_for_user(
        &self,
        user_id: &str,
        token_id: &str,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let index_key = TokenCacheKey::user_tokens(user_id);
        self.store.set_add(&index_key, token_id).await?;

        // The index lives at least as long as its newest token; never shrink it
        match self.store.ttl(&index_key).await? {
            KeyTtl::Expires(current) if current >= ttl_secs => Ok(()),
            _ => self.store.expire(&index_key, ttl_secs).await,
        }
    }

    async fn try_invalidate_token(
        &self,
        token_id: &str,
        fallback_user_id: Option<&str>,
    ) -> StoreResult<()> {
        let owner = match self.read_record(token_id).await {
            Ok(record) => record.map(|r| r.user_id),
            Err(StoreError::Serialization(e)) => {
                warn!(
                    token_id = %token_id,
                    error = %e,
                    "Cached auth token is unreadable; using caller-supplied owner"
                );
                None
            }
            Err(e) => return Err(e),
        };

        self.store.delete(&TokenCacheKey::token(token_id)).await?;

        let user_id = owner
            .filter(|u| !u.is_empty())
            .or_else(|| fallback_user_id.map(str::to_string))
            .filter(|u| !u.is_empty());

        if let Some(user_id) = user_id {
            if let Err(e) = self
                .store
                .set_remove(&TokenCacheKey::user_tokens(&user_id), token_id)
                .await
            {
                log_store_failure("remove_token_from_index", &e);
            }
        }

        debug!(token_id = %token_id, "Auth token invalidated");
        Ok(())
    }

    async fn try_update_user_snapshot(
        &self,
        snapshot: &UserSnapshot,
    ) -> StoreResult<(usize, usize)> {
        let index_key = TokenCacheKey::user_tokens(&snapshot.id);
        let token_ids = self.store.set_members(&index_key).await?;
        if token_ids.is_empty() {
            return Ok((0, 0));
        }

        let payload = serde_json::to_string(&TokenRecord::for_snapshot(snapshot))?;
        let mut updated = 0;
        let mut pruned = 0;

        for token_id in token_ids {
            let token_key = TokenCacheKey::token(&token_id);
            let ttl_secs = match self.store.ttl(&token_key).await? {
                KeyTtl::Missing => None,
                // Redis rejects a zero expiry; keep the record for one more second
                KeyTtl::Expires(secs) => Some(Some(secs.max(1))),
                KeyTtl::Persistent => Some(None),
            };

            // Only rewrite a record that still exists: a revocation may land
            // between the TTL read and the write
            let rewritten = match ttl_secs {
                Some(ttl_secs) => {
                    self.store
                        .set_if_exists(&token_key, &payload, ttl_secs)
                        .await?
                }
                None => false,
            };

            if rewritten {
                updated += 1;
            } else {
                self.store.set_remove(&index_key, &token_id).await?;
                pruned += 1;
            }
        }

        Ok((updated, pruned))
    }

    async fn try_invalidate_all_tokens_for_user(&self, user_id: &str) -> StoreResult<usize> {
        let index_key = TokenCacheKey::user_tokens(user_id);
        let token_ids = self.store.set_members(&index_key).await?;

        let mut failed = 0;
        for token_id in &token_ids {
            if let Err(e) = self.try_invalidate_token(token_id, Some(user_id)).await {
                log_store_failure("invalidate_token", &e);
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(
                user_id = %user_id,
                failed,
                "Some auth tokens could not be revoked; keeping user token index"
            );
            return Ok(token_ids.len() - failed);
        }

        self.store.delete(&index_key).await?;
        Ok(token_ids.len())
    }
}

fn ceil_secs(ttl: Duration) -> u64 {
    if ttl.subsec_nanos() > 0 {
        ttl.as_secs() + 1
    } else {
        ttl.as_secs()
    }
}

fn log_store_failure(operation: &'static str, error: &StoreError) {
    metrics::record_store_error(operation);
    warn!(operation, error = %error, "Auth token cache operation failed");
}
