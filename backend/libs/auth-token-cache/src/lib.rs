//! Session token cache and revocation pipeline
//!
//! Every issued token carries a unique `jti`. The cache keeps one record
//! per live token plus a per-user index of token ids, so that a single
//! session or every session of a user can be revoked at once without the
//! request path touching the primary user store.
//!
//! # Architecture
//!
//! ```text
//! issue_token ──► TokenIssuer ──► TokenCacheService.store_token
//!                                       │
//!                     auth:token:<jti>  │  auth:user:<id>:tokens
//!                                       ▼
//! authenticate ─► TokenValidationGate ─► is_token_active(jti)
//!
//! account change ─► UserStatePublisher ─► queue "user-state"
//!                                              │
//!                                              ▼
//!                      UserStateProcessor ─► update_user_snapshot /
//!                                            invalidate_all_tokens_for_user
//! ```
//!
//! # Example
//!
//! ```no_run
//! use auth_token_cache::{
//!     AuthTokenService, JwtSigner, RedisJobQueue, RedisKeyValueStore, StaticUserDirectory,
//!     TokenCacheService, UserStatePublisher, DEFAULT_COMMAND_TIMEOUT, DEFAULT_TOKEN_LIFETIME,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store =
//!         RedisKeyValueStore::connect("redis://localhost:6379", DEFAULT_COMMAND_TIMEOUT).await?;
//!     let queue = RedisJobQueue::connect(
//!         "redis://localhost:6379",
//!         "user-state",
//!         DEFAULT_COMMAND_TIMEOUT,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     let service = AuthTokenService::new(
//!         Arc::new(TokenCacheService::new(Arc::new(store))),
//!         Arc::new(JwtSigner::new(b"change-me-to-a-secret-of-32-bytes!")),
//!         Arc::new(StaticUserDirectory::new()),
//!         UserStatePublisher::new(Arc::new(queue)),
//!         DEFAULT_TOKEN_LIFETIME,
//!     );
//!
//!     service.revoke_all_tokens("42").await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod gate;
pub mod issuer;
pub mod jobs;
pub mod keys;
mod metrics;
pub mod models;
pub mod publisher;
pub mod queue;
pub mod service;
pub mod signer;
pub mod store;
mod timeout;
pub mod worker;

pub use cache::{RevocationFailurePolicy, TokenCacheService};
pub use error::{
    AuthError, AuthResult, JobDecodeError, QueueError, QueueResult, StoreError, StoreResult,
};
pub use gate::{AuthenticatedUser, StaticUserDirectory, TokenValidationGate, UserDirectory};
pub use issuer::{remaining_ttl_secs, IssuedToken, TokenIssuer, DEFAULT_TOKEN_LIFETIME};
pub use jobs::{JobEnvelope, UserStateJob, USER_STATE_QUEUE};
pub use models::{TokenRecord, UserRole, UserSnapshot};
pub use publisher::{UserStateEvent, UserStatePublisher};
pub use queue::{
    Delivery, DisabledJobQueue, InMemoryJobQueue, JobQueue, JobSource, RedisJobQueue,
};
pub use service::AuthTokenService;
pub use signer::{JwtSigner, TokenClaims, TokenSigner};
pub use store::{
    InMemoryKeyValueStore, KeyTtl, KeyValueStore, RedisKeyValueStore, DEFAULT_COMMAND_TIMEOUT,
};
pub use worker::{JobOutcome, UserStateProcessor, DEFAULT_ERROR_BACKOFF};
