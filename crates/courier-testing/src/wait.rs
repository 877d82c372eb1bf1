use std::time::{Duration, Instant};

use anyhow::{bail, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Uses wall-clock time so it keeps working while a `TestClock` is frozen
/// or racing ahead.
///
/// # Errors
///
/// Returns error if the condition is still false after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("condition not met within {}ms", timeout.as_millis());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
