/// Redis key naming for auth token state and the user-state queue

/// Token record and per-user index keys
pub struct TokenCacheKey;

impl TokenCacheKey {
    /// Key for the cached record of a single token: `auth:token:<jti>`
    pub fn token(token_id: &str) -> String {
        format!("auth:token:{}", token_id)
    }

    /// Key for the set of live token ids of a user: `auth:user:<id>:tokens`
    pub fn user_tokens(user_id: &str) -> String {
        format!("auth:user:{}:tokens", user_id)
    }
}

/// Lists backing a named job queue
pub struct QueueKey;

impl QueueKey {
    /// Jobs waiting to be picked up
    pub fn pending(queue_name: &str) -> String {
        format!("queue:{}:pending", queue_name)
    }

    /// Jobs handed to a worker but not yet acknowledged
    pub fn processing(queue_name: &str) -> String {
        format!("queue:{}:processing", queue_name)
    }
}
