//! Configuration for the user state worker and the services sharing its
//! token cache
//!
//! Loaded from environment variables, plus a `.env` file in debug builds.

use anyhow::{anyhow, bail, Context, Result};
use auth_token_cache::{RevocationFailurePolicy, USER_STATE_QUEUE};
use std::env;
use std::time::Duration;
use tracing::info;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Settings {
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub queue: QueueSettings,
    pub revocation_failure_policy: RevocationFailurePolicy,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            queue: QueueSettings::from_env()?,
            revocation_failure_policy: env::var("REVOCATION_FAILURE_POLICY")
                .unwrap_or_else(|_| "open".to_string())
                .parse()
                .map_err(|e: String| anyhow!(e))
                .context("Invalid REVOCATION_FAILURE_POLICY")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub command_timeout: Duration,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            command_timeout: Duration::from_millis(
                env::var("REDIS_COMMAND_TIMEOUT_MS")
                    .unwrap_or_else(|_| "250".to_string())
                    .parse()
                    .context("Invalid REDIS_COMMAND_TIMEOUT_MS")?,
            ),
        })
    }
}

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    /// Lifetime of newly issued tokens
    pub expires_in: Duration,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            bail!(
                "JWT_SECRET must be at least {} bytes long",
                MIN_JWT_SECRET_LENGTH
            );
        }

        let expires_in = env::var("JWT_EXPIRES_IN").unwrap_or_else(|_| "7d".to_string());
        Ok(Self {
            secret,
            expires_in: parse_duration(&expires_in).context("Invalid JWT_EXPIRES_IN")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub enabled: bool,
    pub name: String,
    /// How long one dequeue call waits for a job
    pub block_timeout: Duration,
    pub error_backoff: Duration,
}

impl QueueSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_bool(
                &env::var("USER_STATE_QUEUE_ENABLED").unwrap_or_else(|_| "true".to_string()),
            )
            .context("Invalid USER_STATE_QUEUE_ENABLED")?,
            name: env::var("USER_STATE_QUEUE_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| USER_STATE_QUEUE.to_string()),
            block_timeout: Duration::from_secs(
                env::var("USER_STATE_QUEUE_BLOCK_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("Invalid USER_STATE_QUEUE_BLOCK_SECS")?,
            ),
            error_backoff: Duration::from_millis(
                env::var("USER_STATE_WORKER_ERROR_BACKOFF_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("Invalid USER_STATE_WORKER_ERROR_BACKOFF_MS")?,
            ),
        })
    }
}

/// Parse a token lifetime such as `3600`, `45m`, `12h` or `7d`.
/// A bare number is seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let (digits, unit_secs) = match value.char_indices().last() {
        Some((i, 's')) => (&value[..i], 1),
        Some((i, 'm')) => (&value[..i], 60),
        Some((i, 'h')) => (&value[..i], 60 * 60),
        Some((i, 'd')) => (&value[..i], 24 * 60 * 60),
        Some(_) => (value, 1),
        None => bail!("empty duration"),
    };

    let amount: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a duration", value))?;
    if amount == 0 {
        bail!("duration must be greater than zero");
    }

    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("duration '{}' is too large", value))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("'{}' is not a boolean", other),
    }
}
