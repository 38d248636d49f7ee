use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Lower and upper bound of a jittered delay, as fractions of the base delay.
const JITTER_MIN: f64 = 0.2;
const JITTER_MAX: f64 = 2.0;

/// Pause inserted before every evaluation so the host is not driven faster
/// than a person would use it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayScheduler {
    base: Duration,
    jitter: bool,
}

impl DelayScheduler {
    pub fn new(base: Duration, jitter: bool) -> Self {
        Self { base, jitter }
    }

    pub fn is_disabled(&self) -> bool {
        self.base.is_zero()
    }

    /// Next delay: zero when disabled, the base delay without jitter,
    /// otherwise a whole number of milliseconds in `[0.2, 2.0] x base`.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        if !self.jitter {
            return self.base;
        }
        let base_ms = self.base.as_millis() as f64;
        let low = (base_ms * JITTER_MIN).round() as u64;
        let high = ((base_ms * JITTER_MAX).round() as u64).max(low);
        Duration::from_millis(rng.random_range(low..=high))
    }

    pub async fn wait<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let delay = self.next_delay(rng);
        if !delay.is_zero() {
            debug!("DelayScheduler: waiting {:?}", delay);
            sleep(delay).await;
        }
        delay
    }
}
