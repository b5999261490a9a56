use std::time::Duration;

use futures::future::BoxFuture;
use log::{error, warn};

use crate::{Error, Result};

/// Additional attempts after the first failure.
pub const MAX_RETRIES: u32 = 3;
/// Fixed spacing between attempts. No backoff growth.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounded-retry settings for [`Database`](crate::Database) operations.
///
/// The default is the application's historical behavior: up to three
/// additional attempts with a fixed one-second delay, giving a worst case of
/// four attempts and roughly three seconds spent waiting.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

/// Runs `attempt` until it succeeds, retrying only the transient storage
/// class.
///
/// Domain rejections pass through unchanged. Any other failure, or running
/// out of retries, collapses into [`Error::OperationFailed`] carrying just
/// the operation name; the underlying cause is logged here and nowhere else.
pub(crate) async fn run_with_retry<'a, T, F>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> BoxFuture<'a, Result<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rejection() => return Err(err),
            Err(err) if err.is_transient() && retries < policy.max_retries => {
                warn!("Retrying {} (attempt {}): {}", operation, retries + 1, err);
                tokio::time::sleep(policy.delay).await;
                retries += 1;
            }
            Err(err) => {
                error!("Error in {}: {}", operation, err);
                return Err(Error::OperationFailed(operation.to_string()));
            }
        }
    }
}
