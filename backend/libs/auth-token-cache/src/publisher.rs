use crate::error::QueueResult;
use crate::jobs::{JobEnvelope, UserStateJob};
use crate::models::UserSnapshot;
use crate::queue::{DisabledJobQueue, JobQueue};
use std::sync::Arc;
use tracing::{info, warn};

/// Account changes that must reach every cached session of the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStateEvent {
    PasswordChanged { user_id: String },
    Deactivated { user_id: String },
    PromotedToAdmin { snapshot: UserSnapshot },
    ProfileUpdated { snapshot: UserSnapshot },
}

impl From<UserStateEvent> for UserStateJob {
    fn from(event: UserStateEvent) -> Self {
        match event {
            UserStateEvent::PasswordChanged { user_id }
            | UserStateEvent::Deactivated { user_id } => UserStateJob::InvalidateTokens { user_id },
            UserStateEvent::PromotedToAdmin { snapshot }
            | UserStateEvent::ProfileUpdated { snapshot } => {
                UserStateJob::SnapshotUpdated { snapshot }
            }
        }
    }
}

/// Producer used by account use cases to schedule cache propagation
#[derive(Clone)]
pub struct UserStatePublisher {
    queue: Arc<dyn JobQueue>,
}

impl UserStatePublisher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        if !queue.is_enabled() {
            warn!(
                "User state queue disabled: revocations and profile changes will not reach \
                 cached tokens until they expire"
            );
        }
        Self { queue }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledJobQueue))
    }

    pub fn is_enabled(&self) -> bool {
        self.queue.is_enabled()
    }

    pub async fn enqueue(&self, job: UserStateJob) -> QueueResult<()> {
        let envelope = JobEnvelope::new(&job);
        self.queue.enqueue(&envelope).await?;

        if self.queue.is_enabled() {
            info!(
                job_id = %envelope.id,
                job_name = %envelope.name,
                user_id = %job.user_id(),
                "User state job enqueued"
            );
        }
        Ok(())
    }

    pub async fn enqueue_snapshot_update(&self, snapshot: UserSnapshot) -> QueueResult<()> {
        self.enqueue(UserStateJob::SnapshotUpdated { snapshot }).await
    }

    pub async fn enqueue_invalidate_tokens(&self, user_id: &str) -> QueueResult<()> {
        self.enqueue(UserStateJob::InvalidateTokens {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn publish(&self, event: UserStateEvent) -> QueueResult<()> {
        self.enqueue(event.into()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::models::UserRole;
    use crate::queue::{InMemoryJobQueue, JobSource};
    use async_trait::async_trait;
    use std::time::Duration;

    fn snapshot() -> UserSnapshot {
        UserSnapshot {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            role: UserRole::Admin,
            bio: String::new(),
            profile_image: String::new(),
            followers_count: 0,
            following_count: 0,
        }
    }

    async fn next_job(queue: &InMemoryJobQueue) -> UserStateJob {
        let delivery = queue.next_delivery().await.unwrap().unwrap();
        JobEnvelope::decode(&delivery.payload)
            .unwrap()
            .to_job()
            .unwrap()
    }

    #[test]
    fn test_events_map_to_jobs() {
        let job: UserStateJob = UserStateEvent::PasswordChanged {
            user_id: "u1".into(),
        }
        .into();
        assert_eq!(
            job,
            UserStateJob::InvalidateTokens {
                user_id: "u1".into()
            }
        );

        let job: UserStateJob = UserStateEvent::PromotedToAdmin {
            snapshot: snapshot(),
        }
        .into();
        assert!(matches!(
            job,
            UserStateJob::SnapshotUpdated { snapshot } if snapshot.role == UserRole::Admin
        ));
    }

    #[tokio::test]
    async fn test_publish_enqueues_jobs() {
        let queue = Arc::new(InMemoryJobQueue::new(Duration::from_millis(10)));
        let publisher = UserStatePublisher::new(queue.clone());

        publisher
            .publish(UserStateEvent::Deactivated {
                user_id: "u1".into(),
            })
            .await
            .unwrap();
        publisher.enqueue_snapshot_update(snapshot()).await.unwrap();

        assert!(matches!(
            next_job(&queue).await,
            UserStateJob::InvalidateTokens { .. }
        ));
        assert!(matches!(
            next_job(&queue).await,
            UserStateJob::SnapshotUpdated { .. }
        ));
    }

    #[tokio::test]
    async fn test_disabled_publisher_succeeds_silently() {
        let publisher = UserStatePublisher::disabled();
        assert!(!publisher.is_enabled());
        assert!(publisher.enqueue_invalidate_tokens("u1").await.is_ok());
    }

    struct BrokenQueue;

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn enqueue(&self, _envelope: &JobEnvelope) -> QueueResult<()> {
            Err(QueueError::Timeout(Duration::from_millis(250)))
        }
    }

    #[tokio::test]
    async fn test_enqueue_errors_reach_the_caller() {
        let publisher = UserStatePublisher::new(Arc::new(BrokenQueue));
        assert!(matches!(
            publisher.enqueue_invalidate_tokens("u1").await,
            Err(QueueError::Timeout(_))
        ));
    }
}
