//! Job queue ports for user state propagation
//!
//! Producers depend on [`JobQueue`]; the worker drains a [`JobSource`].
//! Delivery is at-least-once: a job is only removed from the queue when the
//! worker acknowledges it, so handlers must be idempotent.

use crate::error::QueueResult;
use crate::jobs::JobEnvelope;
use async_trait::async_trait;
use tracing::debug;

mod memory;
mod redis_queue;

pub use self::memory::InMemoryJobQueue;
pub use self::redis_queue::RedisJobQueue;

/// Producer side of the queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, envelope: &JobEnvelope) -> QueueResult<()>;

    /// Whether enqueued jobs reach a worker at all
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Raw job handed to a worker. Acknowledge it once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub payload: String,
}

/// Consumer side of the queue
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Wait up to the source's block timeout for the next job
    async fn next_delivery(&self) -> QueueResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;
}

/// Queue used when propagation is switched off: every job is discarded
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledJobQueue;

#[async_trait]
impl JobQueue for DisabledJobQueue {
    async fn enqueue(&self, envelope: &JobEnvelope) -> QueueResult<()> {
        debug!(
            job_id = %envelope.id,
            job_name = %envelope.name,
            "User state queue disabled, job discarded"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::UserStateJob;

    #[tokio::test]
    async fn test_disabled_queue_accepts_and_discards() {
        let queue = DisabledJobQueue;
        let envelope = JobEnvelope::new(&UserStateJob::InvalidateTokens {
            user_id: "u1".into(),
        });

        assert!(!queue.is_enabled());
        assert!(queue.enqueue(&envelope).await.is_ok());
    }
}
