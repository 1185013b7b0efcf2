use super::{Delivery, JobQueue, JobSource};
use crate::error::QueueResult;
use crate::jobs::JobEnvelope;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// In-process queue implementing both the producer and consumer side.
///
/// Delivered jobs stay in flight until acknowledged, mirroring the Redis
/// queue's processing list.
pub struct InMemoryJobQueue {
    pending: Mutex<VecDeque<String>>,
    in_flight: Mutex<Vec<String>>,
    notify: Notify,
    block_timeout: Duration,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl InMemoryJobQueue {
    pub fn new(block_timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(Vec::new()),
            notify: Notify::new(),
            block_timeout,
        }
    }

    /// Enqueue an already encoded payload, valid or not
    pub async fn push_raw(&self, payload: impl Into<String>) {
        self.pending.lock().await.push_back(payload.into());
        self.notify.notify_one();
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    async fn take(&self) -> Option<Delivery> {
        let mut pending = self.pending.lock().await;
        let payload = pending.pop_front()?;
        self.in_flight.lock().await.push(payload.clone());
        Some(Delivery { payload })
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, envelope: &JobEnvelope) -> QueueResult<()> {
        let payload = envelope.encode()?;
        self.push_raw(payload).await;
        Ok(())
    }
}

#[async_trait]
impl JobSource for InMemoryJobQueue {
    async fn next_delivery(&self) -> QueueResult<Option<Delivery>> {
        if let Some(delivery) = self.take().await {
            return Ok(Some(delivery));
        }

        if tokio::time::timeout(self.block_timeout, self.notify.notified())
            .await
            .is_err()
        {
            return Ok(None);
        }

        Ok(self.take().await)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(pos) = in_flight.iter().position(|p| *p == delivery.payload) {
            in_flight.remove(pos);
        }
        Ok(())
    }
}
