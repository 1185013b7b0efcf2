use super::{Delivery, JobQueue, JobSource};
use crate::error::{QueueError, QueueResult};
use crate::jobs::JobEnvelope;
use crate::keys::QueueKey;
use crate::timeout::with_timeout;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis list queue with a processing list for at-least-once delivery.
///
/// - enqueue: `LPUSH pending`
/// - dequeue: `BRPOPLPUSH pending processing`
/// - ack: `LREM processing`
///
/// Jobs still in the processing list after a worker crash are moved back by
/// [`RedisJobQueue::requeue_in_flight`]. The blocking dequeue holds its
/// connection, so give the worker its own queue instance rather than sharing
/// the cache's connection manager.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    pending_key: String,
    processing_key: String,
    command_timeout: Duration,
    block_timeout: Duration,
}

impl RedisJobQueue {
    pub async fn connect(
        redis_url: &str,
        queue_name: &str,
        command_timeout: Duration,
        block_timeout: Duration,
    ) -> QueueResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = with_timeout(
            CONNECT_TIMEOUT,
            ConnectionManager::new(client),
            QueueError::Timeout,
        )
        .await?;

        info!(queue = %queue_name, "Redis job queue connected");
        Ok(Self::new(conn, queue_name, command_timeout, block_timeout))
    }

    pub fn new(
        conn: ConnectionManager,
        queue_name: &str,
        command_timeout: Duration,
        block_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            pending_key: QueueKey::pending(queue_name),
            processing_key: QueueKey::processing(queue_name),
            command_timeout,
            block_timeout,
        }
    }

    /// Move every unacknowledged job back to the pending list.
    ///
    /// Call once at worker startup, before any job is dequeued.
    pub async fn requeue_in_flight(&self) -> QueueResult<usize> {
        let mut moved = 0;
        loop {
            let mut cmd = redis::cmd("RPOPLPUSH");
            cmd.arg(&self.processing_key).arg(&self.pending_key);
            let job: Option<String> = self.query(cmd, self.command_timeout).await?;
            if job.is_none() {
                break;
            }
            moved += 1;
        }

        if moved > 0 {
            warn!(
                requeued = moved,
                queue = %self.pending_key,
                "Requeued unacknowledged user state jobs"
            );
        }
        Ok(moved)
    }

    pub async fn pending_len(&self) -> QueueResult<usize> {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(&self.pending_key);
        self.query(cmd, self.command_timeout).await
    }

    async fn query<T: FromRedisValue>(
        &self,
        cmd: redis::Cmd,
        deadline: Duration,
    ) -> QueueResult<T> {
        let mut conn = self.conn.clone();
        with_timeout(
            deadline,
            async move { cmd.query_async::<_, T>(&mut conn).await },
            QueueError::Timeout,
        )
        .await
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, envelope: &JobEnvelope) -> QueueResult<()> {
        let payload = envelope.encode()?;
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(&self.pending_key).arg(payload);
        self.query(cmd, self.command_timeout).await
    }
}

#[async_trait]
impl JobSource for RedisJobQueue {
    async fn next_delivery(&self) -> QueueResult<Option<Delivery>> {
        let block_secs = self.block_timeout.as_secs().max(1);
        let mut cmd = redis::cmd("BRPOPLPUSH");
        cmd.arg(&self.pending_key)
            .arg(&self.processing_key)
            .arg(block_secs);

        let deadline = Duration::from_secs(block_secs) + self.command_timeout;
        let payload: Option<String> = self.query(cmd, deadline).await?;
        Ok(payload.map(|payload| Delivery { payload }))
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut cmd = redis::cmd("LREM");
        cmd.arg(&self.processing_key).arg(1).arg(&delivery.payload);
        self.query(cmd, self.command_timeout).await
    }
}
