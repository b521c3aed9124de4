//! Polling a table until it reports ready, with exponential backoff.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::errors::StoreError;

/// Backoff settings for readiness polling.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Initial delay between checks
    pub initial_delay: Duration,
    /// Cap for exponential growth of the delay
    pub max_delay: Duration,
    /// Total time before giving up with [`StoreError::Timeout`]
    pub timeout: Duration,
    /// Jitter factor (0.0 - 1.0) added to each delay
    pub jitter: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
            jitter: 0.25,
        }
    }
}

/// Run `check` until it returns `Ok(true)`.
///
/// `Ok(false)` sleeps and retries; an error is returned immediately. Once
/// `config.timeout` has elapsed the wait fails with [`StoreError::Timeout`].
/// A sleep never runs past the deadline.
pub async fn wait_for_ready<F, Fut>(
    config: &WaitConfig,
    check: F,
    resource_name: &str,
) -> Result<(), StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool, StoreError>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut delay = config.initial_delay;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match check().await {
            Ok(true) => {
                debug!(table = %resource_name, attempts, "ready");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                warn!(table = %resource_name, error = %e, "readiness check failed");
                return Err(e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(StoreError::Timeout {
                name: resource_name.to_string(),
                after: config.timeout,
            });
        }

        let sleep = jittered_delay(delay, config.jitter).min(deadline - now);
        debug!(
            table = %resource_name,
            attempt = attempts,
            delay_ms = sleep.as_millis(),
            "not ready, retrying"
        );
        tokio::time::sleep(sleep).await;

        delay = (delay * 2).min(config.max_delay);
    }
}

/// Add jitter to a duration to prevent thundering herd.
fn jittered_delay(base: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return base;
    }
    let jitter = rand::rng().random_range(0.0..jitter_factor);
    base.mul_f64(1.0 + jitter)
}
