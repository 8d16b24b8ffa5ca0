use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AuraError;
use crate::runtime_config::RuntimeFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_flags(flags: &RuntimeFlags) -> Self {
        Self {
            retries: flags.retry_attempts,
            base_delay: flags.retry_base_delay(),
        }
    }

    pub fn delay_for(&self, retry_index: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(retry_index.min(16)))
    }
}

/// Runs `operation`, retrying with exponential backoff only while it fails
/// with a quota/rate-limit error. Any other error is returned after the
/// first attempt.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, AuraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuraError>>,
{
    let mut retry_index = 0_u32;
    loop {
        match operation().await {
            Ok(value) => {
                if retry_index > 0 {
                    debug!(label, attempts = retry_index + 1, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_quota() && retry_index < policy.retries => {
                let delay = policy.delay_for(retry_index);
                warn!(
                    label,
                    attempt = retry_index + 1,
                    retries = policy.retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "quota limit hit; backing off"
                );
                tokio::time::sleep(delay).await;
                retry_index += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
