//! Entry point for the rest of the system
//!
//! [`AuthTokenService`] wires issuance, validation and revocation over one
//! shared [`TokenCacheService`]. Logout revokes the single token directly.
//! Account-wide revocation and snapshot sync go through the user state
//! queue and land once the worker applies them.

use crate::cache::TokenCacheService;
use crate::error::{AuthResult, QueueResult};
use crate::gate::{AuthenticatedUser, TokenValidationGate, UserDirectory};
use crate::issuer::{IssuedToken, TokenIssuer};
use crate::models::{TokenRecord, UserSnapshot};
use crate::publisher::{UserStateEvent, UserStatePublisher};
use crate::signer::TokenSigner;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AuthTokenService {
    cache: Arc<TokenCacheService>,
    issuer: TokenIssuer,
    gate: TokenValidationGate,
    publisher: UserStatePublisher,
}

impl AuthTokenService {
    pub fn new(
        cache: Arc<TokenCacheService>,
        signer: Arc<dyn TokenSigner>,
        directory: Arc<dyn UserDirectory>,
        publisher: UserStatePublisher,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(signer.clone(), cache.clone()).with_lifetime(token_lifetime),
            gate: TokenValidationGate::new(signer, cache.clone(), directory),
            cache,
            publisher,
        }
    }

    pub fn cache(&self) -> &Arc<TokenCacheService> {
        &self.cache
    }

    pub fn publisher(&self) -> &UserStatePublisher {
        &self.publisher
    }

    pub async fn issue_token(&self, user: &UserSnapshot) -> AuthResult<IssuedToken> {
        self.issuer.issue(user).await
    }

    pub async fn is_token_active(&self, token_id: &str) -> bool {
        self.cache.is_token_active(token_id).await
    }

    /// Cached record of a token, if it is still live
    pub async fn cached_token(&self, token_id: &str) -> Option<TokenRecord> {
        self.cache.get_token(token_id).await
    }

    pub async fn authenticate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        self.gate.authenticate(token).await
    }

    /// Logout: revoke one session immediately
    pub async fn revoke_token(&self, token_id: &str, user_id: &str) {
        self.cache.invalidate_token(token_id, Some(user_id)).await;
        info!(token_id = %token_id, user_id = %user_id, "Token revoked");
    }

    /// Schedule revocation of every session of the user
    pub async fn revoke_all_tokens(&self, user_id: &str) -> QueueResult<()> {
        self.publisher.enqueue_invalidate_tokens(user_id).await
    }

    /// Schedule a refresh of the snapshot cached with every session of the user
    pub async fn sync_snapshot(&self, user: &UserSnapshot) -> QueueResult<()> {
        self.publisher.enqueue_snapshot_update(user.clone()).await
    }

    pub async fn password_changed(&self, user_id: &str) -> QueueResult<()> {
        self.publisher
            .publish(UserStateEvent::PasswordChanged {
                user_id: user_id.to_string(),
            })
            .await
    }

    pub async fn user_deactivated(&self, user_id: &str) -> QueueResult<()> {
        self.publisher
            .publish(UserStateEvent::Deactivated {
                user_id: user_id.to_string(),
            })
            .await
    }

    pub async fn user_promoted(&self, user: &UserSnapshot) -> QueueResult<()> {
        self.publisher
            .publish(UserStateEvent::PromotedToAdmin {
                snapshot: user.clone(),
            })
            .await
    }
}
