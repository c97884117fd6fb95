use std::fmt::Display;
use std::future::Future;

use tokio::time::sleep;

use crate::config::RetryPolicy;

/// Runs `attempt` until it succeeds or `policy.max_attempts` is spent, sleeping
/// with exponential backoff in between. The closure receives the 1-based
/// attempt number. On exhaustion the last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) if n >= max_attempts => return Err(e),
            Err(e) => {
                let pause = policy.delay_after(n);
                log::warn!(
                    "attempt {n}/{max_attempts} failed: {e}; retrying in {:.1}s",
                    pause.as_secs_f64()
                );
                sleep(pause).await;
                n += 1;
            }
        }
    }
}
