use crate::application::optimization::synchronizer::{ReportSynchronizer, SyncStatus};
use crate::domain::errors::{OptimizerError, ParseError};
use crate::domain::optimization::parameter::ParameterAssignment;
use crate::domain::optimization::report::{IterationTiming, PerformanceReport};
use crate::domain::ports::HostAdapter;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const PARTIAL_APPLY_COMMENT: &str = "Some strategy parameters could not be set.";

/// Report of one evaluated assignment and how the recomputation ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: SyncStatus,
    pub report: PerformanceReport,
}

impl Evaluation {
    pub fn is_ready(&self) -> bool {
        self.status == SyncStatus::Ready
    }
}

fn tenths(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 10.0).round() / 10.0
}

/// Applies an assignment on the host and reads back the synchronized report.
pub struct IterationEvaluator {
    synchronizer: ReportSynchronizer,
    data_loading: Duration,
    data_loading_secs: f64,
}

impl IterationEvaluator {
    pub fn new(synchronizer: ReportSynchronizer, data_loading: Duration) -> Self {
        Self {
            synchronizer,
            data_loading,
            data_loading_secs: data_loading.as_secs_f64(),
        }
    }

    /// Reads the report for whatever values the host currently shows.
    pub async fn read_current<H>(&self, host: &H, target_metric: &str) -> Result<Evaluation, ParseError>
    where
        H: HostAdapter + ?Sized,
    {
        let started = Instant::now();
        let outcome = self
            .synchronizer
            .read_when_ready(host, target_metric, None, self.data_loading)
            .await?;
        let mut report = outcome.report;
        report.timing = IterationTiming {
            set_secs: 0.0,
            parse_secs: tenths(started.elapsed()),
        };
        Ok(Evaluation {
            status: outcome.status,
            report,
        })
    }

    /// Applies `assignment`, waits for the host to recompute and parses the report.
    ///
    /// `previous` is the target value of the last accepted iteration. With
    /// `ignore_error` the report-state comment is not attached, for baseline
    /// evaluations whose values may equal what is already on the host.
    pub async fn evaluate<H>(
        &self,
        host: &H,
        strategy_name: &str,
        assignment: &ParameterAssignment,
        target_metric: &str,
        previous: Option<f64>,
        ignore_error: bool,
    ) -> Result<Evaluation, OptimizerError>
    where
        H: HostAdapter + ?Sized,
    {
        host.session().reset_report_changed();
        self.synchronizer.dismiss_stale_notice(host).await;

        let started = Instant::now();
        let applied = host.apply_parameters(strategy_name, assignment).await?;
        if !applied {
            warn!("Evaluator: not every parameter of [{}] could be set", assignment);
        }
        self.synchronizer.dismiss_stale_notice(host).await;
        let settle = Duration::from_millis(self.synchronizer.config().apply_settle_ms);
        if !self.synchronizer.wait_for_regular_update(host, settle).await {
            debug!("Evaluator: no update confirmation after applying parameters");
        }
        let set_secs = tenths(started.elapsed());

        let started = Instant::now();
        let outcome = self
            .synchronizer
            .read_when_ready(host, target_metric, previous, self.data_loading)
            .await?;
        let parse_secs = tenths(started.elapsed());

        let mut report = outcome.report;
        report.timing = IterationTiming { set_secs, parse_secs };
        if !applied {
            report.append_comment(PARTIAL_APPLY_COMMENT);
        }
        if !ignore_error {
            if let Some(comment) = outcome.status.comment(self.data_loading_secs) {
                report.append_comment(&comment);
            }
        }
        Ok(Evaluation {
            status: outcome.status,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_round_to_tenths() {
        assert_eq!(tenths(Duration::from_millis(1249)), 1.2);
        assert_eq!(tenths(Duration::from_millis(1250)), 1.3);
        assert_eq!(tenths(Duration::ZERO), 0.0);
    }
}
