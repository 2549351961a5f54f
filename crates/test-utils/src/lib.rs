//! Shared helpers for the `cmdtask` integration tests.

pub mod builders;
pub mod fake_process;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use cmdtask::logging::LOG_ENV;
use cmdtask::task::{TaskHandle, TaskState};
use tracing_subscriber::{fmt, EnvFilter};

/// Upper bound for any single wait in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Route logs through the test writer, filtered by `CMDTASK_LOG`
/// (default `warn`). Output only shows for failing tests unless run with
/// `--nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step timed out after {TEST_TIMEOUT:?}"),
    }
}

/// Wait until the task reaches `state`.
pub async fn wait_for_state(handle: &TaskHandle, state: TaskState) {
    let mut rx = handle.state_changes();
    let reached = with_timeout(rx.wait_for(|s| *s == state)).await;
    if reached.is_err() {
        panic!("task {} state channel closed before {state}", handle.id());
    }
}

/// Wait until the task's progress value satisfies `pred`; returns that value.
pub async fn wait_for_progress<F>(handle: &TaskHandle, pred: F) -> u32
where
    F: Fn(u32) -> bool,
{
    let mut rx = handle.subscribe();
    let value = with_timeout(rx.wait_for(|p| pred(p.value)))
        .await
        .map(|p| p.value);
    match value {
        Ok(v) => v,
        Err(_) => panic!("task {} progress channel closed", handle.id()),
    }
}
