// Bounded fixed-interval polling

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Call `check` up to `attempts` times, sleeping `interval` between calls.
///
/// Returns the first `Some` the check yields, `None` once every attempt has
/// come back empty, or the first error (errors end the loop immediately).
/// The check receives the 1-based attempt number.
pub async fn poll_fixed<F, Fut, T, E>(
    attempts: u32,
    interval: Duration,
    mut check: F,
) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 1..=attempts {
        if let Some(found) = check(attempt).await? {
            return Ok(Some(found));
        }
        debug!(attempt, attempts, "Nothing yet");
        if attempt < attempts {
            sleep(interval).await;
        }
    }
    Ok(None)
}
