use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::store::StoreError;

/// Exponential backoff schedule for transient store failures. Integrity
/// errors are never retried; they indicate a broken invariant, not a flaky
/// connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
        }
    }
}

pub async fn with_backoff<T, F, Fut>(
    label: &str,
    backoff: &Backoff,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = backoff.base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < backoff.max_attempts => {
                warn!("{label} failed (attempt {attempt}): {e}, retrying");
                let jitter_ms = backoff.base_delay.as_millis().max(1) as u64;
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms));
                tokio::time::sleep(delay + jitter).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
