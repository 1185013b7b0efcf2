//! User state worker
//!
//! Drains the user state queue into the token cache. The composition
//! helpers are shared with services that issue and validate tokens, so
//! both sides agree on keys, queue and failure policy.

pub mod config;

use anyhow::{Context, Result};
use auth_token_cache::{
    AuthTokenService, DisabledJobQueue, JobQueue, JwtSigner, RedisJobQueue, RedisKeyValueStore,
    TokenCacheService, UserDirectory, UserStatePublisher,
};
use config::Settings;
use std::sync::Arc;
use tracing::info;

/// Token cache over Redis with the configured failure policy
pub async fn connect_token_cache(settings: &Settings) -> Result<Arc<TokenCacheService>> {
    let store = RedisKeyValueStore::connect(&settings.redis.url, settings.redis.command_timeout)
        .await
        .context("Failed to connect token cache to Redis")?;

    info!(
        failure_policy = ?settings.revocation_failure_policy,
        "Token cache ready"
    );
    Ok(Arc::new(
        TokenCacheService::new(Arc::new(store))
            .with_failure_policy(settings.revocation_failure_policy),
    ))
}

/// Dedicated queue connection for blocking dequeues
pub async fn connect_job_queue(settings: &Settings) -> Result<RedisJobQueue> {
    RedisJobQueue::connect(
        &settings.redis.url,
        &settings.queue.name,
        settings.redis.command_timeout,
        settings.queue.block_timeout,
    )
    .await
    .with_context(|| format!("Failed to connect job queue '{}'", settings.queue.name))
}

/// Publisher for the configured queue, or a disabled one
pub async fn connect_publisher(settings: &Settings) -> Result<UserStatePublisher> {
    let queue: Arc<dyn JobQueue> = if settings.queue.enabled {
        Arc::new(connect_job_queue(settings).await?)
    } else {
        Arc::new(DisabledJobQueue)
    };
    Ok(UserStatePublisher::new(queue))
}

/// Full token service for a host that issues and validates tokens
pub async fn build_auth_service(
    settings: &Settings,
    directory: Arc<dyn UserDirectory>,
) -> Result<AuthTokenService> {
    Ok(AuthTokenService::new(
        connect_token_cache(settings).await?,
        Arc::new(JwtSigner::new(settings.jwt.secret.as_bytes())),
        directory,
        connect_publisher(settings).await?,
        settings.jwt.expires_in,
    ))
}
