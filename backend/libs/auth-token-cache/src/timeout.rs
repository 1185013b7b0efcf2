use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Run a Redis future with a deadline, mapping both the Redis error and an
/// elapsed deadline into the caller's error type.
pub(crate) async fn with_timeout<F, T, E>(
    duration: Duration,
    future: F,
    on_elapsed: fn(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, redis::RedisError>>,
    E: From<redis::RedisError>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(E::from),
        Err(_) => Err(on_elapsed(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, redis::RedisError>(42) },
            StoreError::Timeout,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapsed() {
        let result = with_timeout(
            Duration::from_millis(250),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, redis::RedisError>(42)
            },
            StoreError::Timeout,
        )
        .await;

        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_redis_error_is_mapped() {
        let result: Result<(), StoreError> = with_timeout(
            Duration::from_secs(1),
            async {
                Err(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection refused",
                )))
            },
            StoreError::Timeout,
        )
        .await;

        assert!(matches!(result, Err(StoreError::Redis(_))));
    }
}
