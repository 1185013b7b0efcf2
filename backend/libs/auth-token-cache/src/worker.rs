//! State propagation worker
//!
//! Drains user state jobs and applies them to the token cache. Every
//! handler is idempotent, so redelivery after a crash and several workers
//! on one queue are both safe.

use crate::cache::TokenCacheService;
use crate::jobs::{JobEnvelope, UserStateJob, INVALIDATE_TOKENS, SNAPSHOT_UPDATED};
use crate::metrics;
use crate::queue::JobSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Terminal result of handling one job. Neither outcome is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Applied(&'static str),
    Dropped(String),
}

impl JobOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, JobOutcome::Applied(_))
    }
}

pub struct UserStateProcessor {
    cache: Arc<TokenCacheService>,
    error_backoff: Duration,
}

impl UserStateProcessor {
    pub fn new(cache: Arc<TokenCacheService>) -> Self {
        Self {
            cache,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Delay before polling again after a queue error
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Decode one raw job and apply it.
    pub async fn process(&self, raw: &str) -> JobOutcome {
        let envelope = match JobEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => return drop_job("unknown", None, e.to_string()),
        };

        let job = match envelope.to_job() {
            Ok(job) => job,
            Err(e) => {
                let kind = match envelope.name.as_str() {
                    SNAPSHOT_UPDATED => SNAPSHOT_UPDATED,
                    INVALIDATE_TOKENS => INVALIDATE_TOKENS,
                    _ => "unknown",
                };
                return drop_job(kind, Some(&envelope), e.to_string());
            }
        };

        match &job {
            UserStateJob::SnapshotUpdated { snapshot } => {
                self.cache.update_user_snapshot(snapshot).await;
            }
            UserStateJob::InvalidateTokens { user_id } => {
                self.cache.invalidate_all_tokens_for_user(user_id).await;
            }
        }

        debug!(
            job_id = %envelope.id,
            job_name = job.name(),
            user_id = %job.user_id(),
            "User state job applied"
        );
        metrics::record_job(job.name(), "applied");
        JobOutcome::Applied(job.name())
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// A job that has been dequeued is always processed and acknowledged
    /// before the loop checks for shutdown again. Returns the number of
    /// jobs handled.
    pub async fn run(
        &self,
        source: Arc<dyn JobSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!(
            error_backoff_ms = self.error_backoff.as_millis() as u64,
            "User state worker starting"
        );

        let mut handled = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = source.next_delivery() => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    self.process(&delivery.payload).await;
                    handled += 1;
                    if let Err(e) = source.ack(&delivery).await {
                        warn!(error = %e, "Failed to acknowledge user state job");
                    }
                }
                Ok(None) => debug!("No user state jobs pending"),
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_ms = self.error_backoff.as_millis() as u64,
                        "User state queue error, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        info!(jobs_handled = handled, "User state worker stopped");
        handled
    }
}

fn drop_job(kind: &str, envelope: Option<&JobEnvelope>, reason: String) -> JobOutcome {
    warn!(
        job_id = envelope.map(|e| e.id.as_str()).unwrap_or_default(),
        job_name = envelope.map(|e| e.name.as_str()).unwrap_or_default(),
        reason = %reason,
        "Dropping user state job"
    );
    metrics::record_job(kind, "dropped");
    JobOutcome::Dropped(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueueError, QueueResult};
    use crate::models::{UserRole, UserSnapshot};
    use crate::queue::{Delivery, InMemoryJobQueue, JobQueue};
    use crate::store::InMemoryKeyValueStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(id: &str, bio: &str) -> UserSnapshot {
        UserSnapshot {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{}@example.com", id),
            role: UserRole::User,
            bio: bio.to_string(),
            profile_image: String::new(),
            followers_count: 0,
            following_count: 0,
        }
    }

    fn processor() -> (UserStateProcessor, Arc<TokenCacheService>) {
        let cache = Arc::new(TokenCacheService::new(Arc::new(
            InMemoryKeyValueStore::new(),
        )));
        (UserStateProcessor::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_invalidate_job_revokes_tokens() {
        let (processor, cache) = processor();
        cache
            .store_token("t1", &snapshot("u1", ""), Duration::from_secs(60))
            .await;

        let raw = JobEnvelope::new(&UserStateJob::InvalidateTokens {
            user_id: "u1".into(),
        })
        .encode()
        .unwrap();

        assert_eq!(
            processor.process(&raw).await,
            JobOutcome::Applied(INVALIDATE_TOKENS)
        );
        assert!(!cache.is_token_active("t1").await);
    }

    #[tokio::test]
    async fn test_snapshot_job_updates_cached_snapshot() {
        let (processor, cache) = processor();
        cache
            .store_token("t1", &snapshot("u1", "old"), Duration::from_secs(60))
            .await;

        let raw = JobEnvelope::new(&UserStateJob::SnapshotUpdated {
            snapshot: snapshot("u1", "new"),
        })
        .encode()
        .unwrap();

        assert!(processor.process(&raw).await.is_applied());
        assert_eq!(cache.get_token("t1").await.unwrap().snapshot.bio, "new");
    }

    #[tokio::test]
    async fn test_bad_jobs_are_dropped() {
        let (processor, _) = processor();
        let before = metrics::jobs("unknown", "dropped");

        assert!(matches!(processor.process("{oops").await, JobOutcome::Dropped(_)));
        assert!(matches!(
            processor
                .process(r#"{"id":"1","name":"USER_EXPLODED","data":{}}"#)
                .await,
            JobOutcome::Dropped(_)
        ));
        assert!(matches!(
            processor
                .process(r#"{"id":"1","name":"USER_INVALIDATE_TOKENS","data":{}}"#)
                .await,
            JobOutcome::Dropped(_)
        ));

        assert!(metrics::jobs("unknown", "dropped") >= before + 2);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_acks_until_shutdown() {
        let (processor, cache) = processor();
        cache
            .store_token("t1", &snapshot("u1", ""), Duration::from_secs(60))
            .await;

        let queue = Arc::new(InMemoryJobQueue::new(Duration::from_millis(20)));
        queue
            .enqueue(&JobEnvelope::new(&UserStateJob::InvalidateTokens {
                user_id: "u1".into(),
            }))
            .await
            .unwrap();
        queue.push_raw("garbage").await;

        let (tx, rx) = watch::channel(false);
        let source: Arc<dyn JobSource> = queue.clone();
        let worker = tokio::spawn(async move { processor.run(source, rx).await });

        while queue.pending_len().await > 0 || queue.in_flight_len().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        assert_eq!(worker.await.unwrap(), 2);
        assert!(!cache.is_token_active("t1").await);
    }

    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobSource for FlakySource {
        async fn next_delivery(&self) -> QueueResult<Option<Delivery>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Timeout(Duration::from_millis(250)))
        }

        async fn ack(&self, _delivery: &Delivery) -> QueueResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_errors_back_off() {
        let (processor, _) = processor();
        let processor = processor.with_error_backoff(Duration::from_secs(1));
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });

        let (tx, rx) = watch::channel(false);
        let worker = {
            let source: Arc<dyn JobSource> = source.clone();
            tokio::spawn(async move { processor.run(source, rx).await })
        };

        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.send(true).unwrap();
        assert_eq!(worker.await.unwrap(), 0);

        let calls = source.calls.load(Ordering::SeqCst);
        assert!((3..=5).contains(&calls), "calls = {}", calls);
    }
}
