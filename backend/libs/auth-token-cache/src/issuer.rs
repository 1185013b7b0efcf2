use crate::cache::TokenCacheService;
use crate::error::AuthResult;
use crate::models::UserSnapshot;
use crate::signer::{TokenClaims, TokenSigner};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Token lifetime when none is configured (7 days)
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    /// Seconds the token was cached for, `None` when caching was skipped
    pub ttl_seconds: Option<u64>,
}

/// Mints signed tokens and registers them in the token cache
pub struct TokenIssuer {
    signer: Arc<dyn TokenSigner>,
    cache: Arc<TokenCacheService>,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(signer: Arc<dyn TokenSigner>, cache: Arc<TokenCacheService>) -> Self {
        Self {
            signer,
            cache,
            lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a token for `user` and cache its snapshot under a fresh `jti`.
    ///
    /// Only a signing failure is an error. If the signed token cannot be
    /// decoded back, it is returned uncached and the validation gate will
    /// reject it.
    pub async fn issue(&self, user: &UserSnapshot) -> AuthResult<IssuedToken> {
        let token_id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let exp = now.saturating_add(lifetime);

        let claims = TokenClaims::for_user(user, token_id.clone(), now, exp);
        let token = self.signer.sign(&claims)?;

        let Some(decoded) = self.signer.decode(&token) else {
            warn!(
                token_id = %token_id,
                user_id = %user.id,
                "Issued token could not be decoded, skipping cache registration"
            );
            return Ok(IssuedToken {
                token,
                token_id,
                ttl_seconds: None,
            });
        };

        let ttl = remaining_ttl_secs(decoded.exp, Utc::now().timestamp());
        // The cache ignores a zero TTL, so such a token is never registered
        self.cache
            .store_token(&token_id, user, Duration::from_secs(ttl))
            .await;

        debug!(token_id = %token_id, user_id = %user.id, ttl_secs = ttl, "Token issued");
        Ok(IssuedToken {
            token,
            token_id,
            ttl_seconds: (ttl > 0).then_some(ttl),
        })
    }
}

/// Whole seconds between `now` and `exp`, never negative
pub fn remaining_ttl_secs(exp: i64, now: i64) -> u64 {
    exp.saturating_sub(now).max(0) as u64
}
