//! Waits for the host to finish recomputing a report before it is read.
//!
//! The host gives no completion callback. Instead the synchronizer watches
//! the stale-report notice, update notifications, the progress/ready/error
//! indicators and the session's report-change flag, all polled with bounded
//! waits.

use crate::application::optimization::parser::ReportParser;
use crate::config::SynchronizerConfig;
use crate::domain::errors::ParseError;
use crate::domain::optimization::report::PerformanceReport;
use crate::domain::ports::{HostAdapter, ReportIndicators};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const UPDATE_SUCCESS_PHRASES: [&str; 3] = [
    "report has been updated successfully",
    "report updated successfully",
    "successfully updated",
];
const UPDATE_FAILURE_PHRASES: [&str; 3] = ["error", "failed", "unable"];
const UPDATING_PHRASE: &str = "updating report";

/// How a recomputation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Ready,
    /// The host never started recomputing.
    NotStarted,
    /// The host reported a calculation error.
    HostError,
    /// The recomputation started but did not finish in time.
    TimedOut,
}

impl SyncStatus {
    /// Comment attached to an iteration that did not reach `Ready`.
    pub fn comment(&self, data_loading_secs: f64) -> Option<String> {
        match self {
            SyncStatus::Ready => None,
            SyncStatus::HostError => Some(
                "The host reported an error when calculating the strategy based on these parameter values"
                    .to_string(),
            ),
            SyncStatus::NotStarted => Some(
                "The calculation process has not started for the strategy based on these parameter values"
                    .to_string(),
            ),
            SyncStatus::TimedOut => Some(format!(
                "The calculation of the strategy parameters took more than {} seconds for one combination. Testing of this combination is skipped.",
                data_loading_secs
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub report: PerformanceReport,
}

/// Polls `condition` every `interval` until it returns true or `timeout` elapses.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}

fn matches_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

pub struct ReportSynchronizer {
    config: SynchronizerConfig,
    parser: ReportParser,
}

impl ReportSynchronizer {
    pub fn new(config: SynchronizerConfig, parser: ReportParser) -> Self {
        Self { config, parser }
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    /// Clicks the stale notice if it is shown. Returns whether a click happened.
    pub async fn dismiss_stale_notice<H>(&self, host: &H) -> bool
    where
        H: ReportIndicators + ?Sized,
    {
        if !host.stale_notice_visible().await {
            return false;
        }
        match host.click_update_report().await {
            Ok(()) => true,
            Err(e) => {
                warn!("ReportSync: could not click the update notice: {}", e);
                false
            }
        }
    }

    /// Waits for the host to acknowledge a requested update.
    ///
    /// A success notification counts, and so does the stale notice
    /// disappearing after the grace period. A failure notification does not.
    pub async fn wait_for_update_ack<H>(&self, host: &H, timeout: Duration) -> bool
    where
        H: ReportIndicators + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let grace = Duration::from_millis(self.config.stale_notice_grace_ms);
        loop {
            for text in host.notifications().await {
                let text = text.to_lowercase();
                if matches_any(&text, &UPDATE_SUCCESS_PHRASES) {
                    return true;
                }
                if matches_any(&text, &UPDATE_FAILURE_PHRASES) {
                    debug!("ReportSync: update failure notification: {}", text);
                    return false;
                }
            }
            if started.elapsed() > grace && !host.stale_notice_visible().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.notification_poll()).await;
        }
    }

    /// Watches notifications after a regular recomputation.
    ///
    /// Returns false when an update was announced but never confirmed, or a
    /// failure was shown; true when no update was announced at all.
    pub async fn wait_for_regular_update<H>(&self, host: &H, timeout: Duration) -> bool
    where
        H: ReportIndicators + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        let mut saw_updating = false;
        loop {
            for text in host.notifications().await {
                let text = text.to_lowercase();
                if text.contains(UPDATING_PHRASE) {
                    saw_updating = true;
                }
                if matches_any(&text, &UPDATE_SUCCESS_PHRASES) {
                    return true;
                }
                if matches_any(&text, &UPDATE_FAILURE_PHRASES) {
                    return false;
                }
            }
            if Instant::now() >= deadline {
                return !saw_updating;
            }
            sleep(self.config.notification_poll()).await;
        }
    }

    /// Makes sure a stale report is refreshed before it is read.
    ///
    /// A missing acknowledgement is logged and the caller proceeds anyway.
    pub async fn ensure_current<H>(&self, host: &H) -> bool
    where
        H: ReportIndicators + ?Sized,
    {
        if !self.dismiss_stale_notice(host).await {
            return true;
        }
        let timeout = Duration::from_millis(self.config.update_ack_timeout_ms);
        if self.wait_for_update_ack(host, timeout).await {
            debug!("ReportSync: report refreshed");
            true
        } else {
            info!("ReportSync: report refresh not acknowledged, continuing");
            false
        }
    }

    /// Waits for the current recomputation and parses the resulting report.
    ///
    /// `previous` is the target value of the last accepted iteration. When no
    /// completion signal was observed but the parsed target differs from it,
    /// the recomputation is taken as finished.
    pub async fn read_when_ready<H>(
        &self,
        host: &H,
        target_metric: &str,
        previous: Option<f64>,
        max_wait: Duration,
    ) -> Result<SyncOutcome, ParseError>
    where
        H: HostAdapter + ?Sized,
    {
        self.ensure_current(host).await;

        let poll = self.config.poll_interval();
        let mut started = poll_until(
            Duration::from_millis(self.config.progress_appear_timeout_ms),
            poll,
            || host.progress_visible(),
        )
        .await;
        let mut finished = host.session().report_changed();
        let mut failed = false;

        if started {
            let deadline = Instant::now() + Duration::from_millis(self.config.error_watch_ms);
            loop {
                if host.error_visible().await {
                    failed = true;
                    break;
                }
                if host.ready_visible().await {
                    finished = true;
                    break;
                }
                if Instant::now() >= deadline {
                    break;
                }
                sleep(poll).await;
            }
            if !failed {
                finished = poll_until(max_wait, poll, || host.ready_visible()).await;
            }
        } else if finished {
            started = true;
        }

        failed = failed || host.error_visible().await;
        sleep(Duration::from_millis(self.config.digits_settle_ms)).await;

        let mut report = PerformanceReport::new();
        if !failed {
            if self.dismiss_stale_notice(host).await {
                let timeout = Duration::from_millis(self.config.pre_read_ack_timeout_ms);
                if !self.wait_for_update_ack(host, timeout).await {
                    info!("ReportSync: update not acknowledged, parsing anyway");
                }
            } else {
                let timeout = Duration::from_millis(self.config.notification_watch_ms);
                if !self.wait_for_regular_update(host, timeout).await {
                    debug!("ReportSync: no update confirmation before parsing");
                }
            }
            sleep(Duration::from_millis(self.config.render_settle_ms)).await;
            report = self.parser.parse(host, host.session(), target_metric).await?;
        }

        if !failed && !finished {
            if let (Some(previous), Some(current)) = (previous, report.number(target_metric)) {
                if current != previous {
                    debug!("ReportSync: target changed without a completion signal");
                    started = true;
                    finished = true;
                }
            }
        }

        let status = if failed {
            SyncStatus::HostError
        } else if !started {
            SyncStatus::NotStarted
        } else if !finished {
            SyncStatus::TimedOut
        } else {
            SyncStatus::Ready
        };
        Ok(SyncOutcome { status, report })
    }
}
