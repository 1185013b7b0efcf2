//! Per-request token validation
//!
//! Order of checks:
//! 1. signature and expiry
//! 2. presence of a `jti`
//! 3. liveness of the `jti` in the token cache
//! 4. the user still exists and is active
//!
//! A token that fails any check is unauthorized.

use crate::cache::TokenCacheService;
use crate::error::{AuthError, AuthResult};
use crate::models::UserSnapshot;
use crate::signer::TokenSigner;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Lookup into the primary user store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` when the user does not exist or is no longer active
    async fn find_active_user(&self, user_id: &str) -> AuthResult<Option<UserSnapshot>>;
}

/// Directory over a fixed set of users, for tests and local tooling
#[derive(Default)]
pub struct StaticUserDirectory {
    users: DashMap<String, UserSnapshot>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, user: UserSnapshot) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn remove(&self, user_id: &str) {
        self.users.remove(user_id);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find_active_user(&self, user_id: &str) -> AuthResult<Option<UserSnapshot>> {
        Ok(self.users.get(user_id).map(|user| user.value().clone()))
    }
}

/// Caller identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user: UserSnapshot,
    /// Needed to revoke this session on logout
    pub token_id: String,
}

pub struct TokenValidationGate {
    signer: Arc<dyn TokenSigner>,
    cache: Arc<TokenCacheService>,
    directory: Arc<dyn UserDirectory>,
}

impl TokenValidationGate {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        cache: Arc<TokenCacheService>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            signer,
            cache,
            directory,
        }
    }

    pub async fn authenticate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        let claims = self.signer.verify(token)?;

        if claims.jti.is_empty() {
            return Err(AuthError::InvalidTokenPayload);
        }

        if !self.cache.is_token_active(&claims.jti).await {
            debug!(token_id = %claims.jti, user_id = %claims.sub, "Rejected revoked token");
            return Err(AuthError::TokenRevoked);
        }

        if claims.sub.is_empty() {
            return Err(AuthError::UserNotFound);
        }

        let user = self
            .directory
            .find_active_user(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(AuthenticatedUser {
            user,
            token_id: claims.jti,
        })
    }
}
