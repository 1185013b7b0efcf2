//! Worker end to end against a live Redis
//!
//! Run with: cargo test -p user-state-worker --test worker_test -- --ignored

use auth_token_cache::{
    JobSource, RevocationFailurePolicy, StaticUserDirectory, UserRole, UserSnapshot,
    UserStateProcessor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use user_state_worker::config::{JwtSettings, QueueSettings, RedisSettings, Settings};

fn settings(queue_name: &str) -> Settings {
    Settings {
        redis: RedisSettings {
            url: "redis://127.0.0.1:6379".to_string(),
            command_timeout: Duration::from_millis(250),
        },
        jwt: JwtSettings {
            secret: "worker-test-secret-with-at-least-32-bytes".to_string(),
            expires_in: Duration::from_secs(600),
        },
        queue: QueueSettings {
            enabled: true,
            name: queue_name.to_string(),
            block_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(100),
        },
        revocation_failure_policy: RevocationFailurePolicy::Open,
    }
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_deactivation_revokes_session_through_worker() {
    let settings = settings(&format!("worker-test-{}", std::process::id()));
    let user = UserSnapshot {
        id: format!("worker-test-user-{}", std::process::id()),
        username: "worker".to_string(),
        email: "worker@example.com".to_string(),
        role: UserRole::User,
        bio: String::new(),
        profile_image: String::new(),
        followers_count: 0,
        following_count: 0,
    };

    let directory = StaticUserDirectory::new();
    directory.upsert(user.clone());
    let service = user_state_worker::build_auth_service(&settings, Arc::new(directory))
        .await
        .expect("Failed to build auth service");

    let issued = service.issue_token(&user).await.unwrap();
    assert!(service.authenticate(&issued.token).await.is_ok());

    let cache = user_state_worker::connect_token_cache(&settings).await.unwrap();
    let source: Arc<dyn JobSource> =
        Arc::new(user_state_worker::connect_job_queue(&settings).await.unwrap());
    let (tx, rx) = watch::channel(false);
    let worker = tokio::spawn(async move { UserStateProcessor::new(cache).run(source, rx).await });

    service.user_deactivated(&user.id).await.unwrap();

    let mut revoked = false;
    for _ in 0..50 {
        if !service.is_token_active(&issued.token_id).await {
            revoked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    tx.send(true).unwrap();
    worker.await.unwrap();
    assert!(revoked, "token still active after worker ran");
}
