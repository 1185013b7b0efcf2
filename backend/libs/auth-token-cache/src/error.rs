//! Error types for the token cache, job queue and authentication gate

use std::time::Duration;
use thiserror::Error;

/// Key-value store failures.
///
/// These never leave [`crate::TokenCacheService`]; they are logged and the
/// operation degrades to its documented default.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Command did not complete within the adapter timeout
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Cached value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key holds a value of a different kind than the command expects
    #[error("Wrong value type at key {0}")]
    WrongType(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Job queue failures, surfaced to producers and logged by the worker loop
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Queue operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Reasons a dequeued job cannot be applied. A job failing to decode is
/// dropped, never retried.
#[derive(Error, Debug)]
pub enum JobDecodeError {
    #[error("Malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown job kind: {0}")]
    UnknownKind(String),

    #[error("Snapshot update job without snapshot data")]
    MissingSnapshot,

    #[error("Invalidate tokens job without userId")]
    MissingUserId,
}

/// Authentication failures. Every variant is an unauthorized outcome for
/// the request that produced it, except signing and directory faults.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,

    #[error("invalid token payload")]
    InvalidTokenPayload,

    #[error("token revoked")]
    TokenRevoked,

    #[error("user not found or inactive")]
    UserNotFound,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("User directory error: {0}")]
    Directory(String),
}

impl AuthError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken
                | AuthError::InvalidTokenPayload
                | AuthError::TokenRevoked
                | AuthError::UserNotFound
        )
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_messages() {
        assert_eq!(
            AuthError::InvalidTokenPayload.to_string(),
            "invalid token payload"
        );
        assert_eq!(AuthError::TokenRevoked.to_string(), "token revoked");
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(AuthError::InvalidToken.is_unauthorized());
        assert!(AuthError::TokenRevoked.is_unauthorized());
        assert!(AuthError::UserNotFound.is_unauthorized());
        assert!(!AuthError::Signing("bad key".into()).is_unauthorized());
        assert!(!AuthError::Directory("db down".into()).is_unauthorized());
    }

    #[test]
    fn test_job_decode_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json");
        let err: JobDecodeError = json_err.unwrap_err().into();
        assert!(matches!(err, JobDecodeError::Malformed(_)));
    }
}
