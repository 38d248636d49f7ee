use crate::domain::errors::{AdapterUnavailableError, HostError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

pub const CONNECT_POLL: Duration = Duration::from_millis(100);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects a host adapter, polling `connect` until it succeeds or `wait` elapses.
///
/// Non-retryable host errors end the wait immediately.
pub async fn initialize_session<A, F, Fut>(mut connect: F, wait: Duration) -> Result<A, AdapterUnavailableError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<A, HostError>>,
{
    let started = Instant::now();
    let deadline = started + wait;
    loop {
        let reason = match connect().await {
            Ok(adapter) => {
                info!("HostSession: adapter ready after {:?}", started.elapsed());
                return Ok(adapter);
            }
            Err(e) if !e.is_retryable() => {
                warn!("HostSession: adapter failed: {}", e);
                return Err(AdapterUnavailableError {
                    waited_ms: started.elapsed().as_millis() as u64,
                    reason: e.to_string(),
                });
            }
            Err(e) => e.to_string(),
        };
        if Instant::now() >= deadline {
            warn!("HostSession: adapter unavailable: {}", reason);
            return Err(AdapterUnavailableError {
                waited_ms: started.elapsed().as_millis() as u64,
                reason,
            });
        }
        debug!("HostSession: adapter not ready ({}), polling", reason);
        sleep(CONNECT_POLL).await;
    }
}
