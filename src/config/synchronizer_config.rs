//! Timing heuristics used while waiting for the host to recompute a report.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynchronizerConfig {
    /// Polling interval for indicators.
    pub poll_interval_ms: u64,
    /// Polling interval for notifications.
    pub notification_poll_ms: u64,
    /// Wait for the update acknowledgement after clicking a stale notice.
    pub update_ack_timeout_ms: u64,
    /// Same wait when the notice shows up right before reading.
    pub pre_read_ack_timeout_ms: u64,
    /// How long the stale notice may stay before its disappearance counts as success.
    pub stale_notice_grace_ms: u64,
    pub progress_appear_timeout_ms: u64,
    pub error_watch_ms: u64,
    /// Wait for update notifications when no stale notice was shown.
    pub notification_watch_ms: u64,
    /// Wait for the recomputation to start after parameters were applied.
    pub apply_settle_ms: u64,
    /// Time for freshly rendered digits to settle.
    pub digits_settle_ms: u64,
    /// Time for the report table to finish rendering before it is read.
    pub render_settle_ms: u64,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            notification_poll_ms: 50,
            update_ack_timeout_ms: 12_000,
            pre_read_ack_timeout_ms: 5_000,
            stale_notice_grace_ms: 500,
            progress_appear_timeout_ms: 2_500,
            error_watch_ms: 5_000,
            notification_watch_ms: 2_000,
            apply_settle_ms: 1_000,
            digits_settle_ms: 250,
            render_settle_ms: 500,
        }
    }
}

impl SynchronizerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn notification_poll(&self) -> Duration {
        Duration::from_millis(self.notification_poll_ms.max(1))
    }

    /// Every wait multiplied by `factor`, for hosts that respond faster.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |ms: u64| ((ms as f64) * factor.max(0.0)).round() as u64;
        Self {
            poll_interval_ms: scale(self.poll_interval_ms).max(1),
            notification_poll_ms: scale(self.notification_poll_ms).max(1),
            update_ack_timeout_ms: scale(self.update_ack_timeout_ms),
            pre_read_ack_timeout_ms: scale(self.pre_read_ack_timeout_ms),
            stale_notice_grace_ms: scale(self.stale_notice_grace_ms),
            progress_appear_timeout_ms: scale(self.progress_appear_timeout_ms),
            error_watch_ms: scale(self.error_watch_ms),
            notification_watch_ms: scale(self.notification_watch_ms),
            apply_settle_ms: scale(self.apply_settle_ms),
            digits_settle_ms: scale(self.digits_settle_ms),
            render_settle_ms: scale(self.render_settle_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_keeps_polling_positive() {
        let fast = SynchronizerConfig::default().scaled(0.01);
        assert_eq!(fast.update_ack_timeout_ms, 120);
        assert_eq!(fast.digits_settle_ms, 3);
        assert_eq!(fast.poll_interval_ms, 1);
        assert_eq!(fast.notification_poll_ms, 1);
    }
}
