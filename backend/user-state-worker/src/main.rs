use anyhow::{Context, Result};
use auth_token_cache::{JobSource, UserStateProcessor};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use user_state_worker::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "user_state_worker=info,auth_token_cache=info,info".into()
        }))
        .with_target(true)
        .json()
        .init();

    info!("Starting user state worker");

    let settings = Settings::load().context("Failed to load configuration")?;

    if !settings.queue.enabled {
        warn!(
            "USER_STATE_QUEUE_ENABLED is false: revocation propagation is disabled and \
             cached tokens only expire by TTL"
        );
        return Ok(());
    }

    let cache = user_state_worker::connect_token_cache(&settings).await?;
    let queue = Arc::new(user_state_worker::connect_job_queue(&settings).await?);

    queue
        .requeue_in_flight()
        .await
        .context("Failed to requeue unacknowledged jobs")?;

    let processor =
        UserStateProcessor::new(cache).with_error_backoff(settings.queue.error_backoff);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source: Arc<dyn JobSource> = queue;
    let worker = tokio::spawn(async move { processor.run(source, shutdown_rx).await });

    info!(
        queue = %settings.queue.name,
        block_secs = settings.queue.block_timeout.as_secs(),
        "User state worker running"
    );

    shutdown_signal().await?;
    info!("Shutdown signal received, finishing current job");
    let _ = shutdown_tx.send(true);

    let handled = worker.await.context("User state worker task failed")?;
    info!(jobs_handled = handled, "User state worker shut down");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl+c")?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
