use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};
use tracing::warn;

static STORE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "token_cache_store_errors_total",
                "Key-value store failures absorbed by the token cache",
            ),
            &["operation"],
        )
        .expect("valid metric opts for token_cache_store_errors_total"),
    )
});

static USER_STATE_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "user_state_jobs_total",
                "User state jobs handled by the propagation worker",
            ),
            &["kind", "outcome"],
        )
        .expect("valid metric opts for user_state_jobs_total"),
    )
});

fn register(counter: IntCounterVec) -> IntCounterVec {
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        warn!("Failed to register token cache metric: {}", e);
    }
    counter
}

pub(crate) fn record_store_error(operation: &str) {
    STORE_ERRORS.with_label_values(&[operation]).inc();
}

pub(crate) fn record_job(kind: &str, outcome: &str) {
    USER_STATE_JOBS.with_label_values(&[kind, outcome]).inc();
}

#[cfg(test)]
pub(crate) fn store_errors(operation: &str) -> u64 {
    STORE_ERRORS.with_label_values(&[operation]).get()
}

#[cfg(test)]
pub(crate) fn jobs(kind: &str, outcome: &str) -> u64 {
    USER_STATE_JOBS.with_label_values(&[kind, outcome]).get()
}
