//! In-process charting host used by the CLI simulation and the tests.
//!
//! The report is computed from the applied parameters by an objective
//! closure and rendered as table rows the way the host renders them. Timing
//! follows tokio's clock, so paused-time tests run instantly.

use crate::domain::errors::HostError;
use crate::domain::optimization::parameter::ParameterAssignment;
use crate::domain::ports::{HostAdapter, RawRow, ReportIndicators, ReportSource, StrategyDefinition};
use crate::domain::session::HostSession;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Metric rows (`name`, value of the "All" column) for an assignment.
pub type Objective = Arc<dyn Fn(&ParameterAssignment) -> Vec<(String, f64)> + Send + Sync>;

pub const UPDATED_NOTIFICATION: &str = "Report has been updated successfully";

/// How the simulated host reacts to parameter changes.
#[derive(Debug, Clone, PartialEq)]
pub struct MockBehavior {
    /// Recomputation time after an apply; progress is shown meanwhile.
    pub compute_time: Duration,
    /// Raise the session's report-change flag when the report is recomputed.
    pub mark_changed: bool,
    /// Show the error indicator after every apply.
    pub error_after_apply: bool,
    /// Keep showing progress forever after an apply.
    pub hang: bool,
    /// Leave the report stale until the update notice is clicked.
    pub stale_until_clicked: bool,
    /// Report that some inputs could not be set.
    pub partial_apply: bool,
    /// `headers()` fails this many times before succeeding.
    pub header_failures: u32,
    /// Cancellation is requested once this many applies happened.
    pub cancel_after_applies: Option<usize>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            compute_time: Duration::from_millis(300),
            mark_changed: true,
            error_after_apply: false,
            hang: false,
            stale_until_clicked: false,
            partial_apply: false,
            header_failures: 0,
            cancel_after_applies: None,
        }
    }
}

impl MockBehavior {
    /// Recomputes without progress, ready signal or change flag.
    pub fn silent() -> Self {
        Self {
            compute_time: Duration::ZERO,
            mark_changed: false,
            ..Self::default()
        }
    }
}

struct MockState {
    applied: ParameterAssignment,
    /// Parameters the rendered report reflects.
    shown: ParameterAssignment,
    history: Vec<ParameterAssignment>,
    busy_until: Option<Instant>,
    stale: bool,
    errored: bool,
    notifications: Vec<String>,
    header_failures: u32,
    timeframe: Option<String>,
}

pub struct MockHost {
    definition: StrategyDefinition,
    objective: Objective,
    behavior: MockBehavior,
    session: HostSession,
    state: Mutex<MockState>,
}

impl MockHost {
    pub fn new(definition: StrategyDefinition, objective: Objective) -> Self {
        let current = definition.current.clone();
        Self {
            definition,
            objective,
            behavior: MockBehavior::default(),
            session: HostSession::new(),
            state: Mutex::new(MockState {
                applied: current.clone(),
                shown: current,
                history: Vec::new(),
                busy_until: None,
                stale: false,
                errored: false,
                notifications: Vec::new(),
                header_failures: 0,
                timeframe: None,
            }),
        }
    }

    /// Host whose report has a net profit from `net_profit` and 100 trades.
    pub fn with_net_profit<F>(definition: StrategyDefinition, net_profit: F) -> Self
    where
        F: Fn(&ParameterAssignment) -> f64 + Send + Sync + 'static,
    {
        Self::new(
            definition,
            Arc::new(move |assignment| {
                vec![
                    ("Net profit".to_string(), net_profit(assignment)),
                    ("Total trades".to_string(), 100.0),
                ]
            }),
        )
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.lock().header_failures = behavior.header_failures;
        self.behavior = behavior;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply_count(&self) -> usize {
        self.lock().history.len()
    }

    /// Every applied assignment, in order.
    pub fn applied_history(&self) -> Vec<ParameterAssignment> {
        self.lock().history.clone()
    }

    pub fn timeframe(&self) -> Option<String> {
        self.lock().timeframe.clone()
    }

    fn render(&self) -> Vec<RawRow> {
        let shown = self.lock().shown.clone();
        (self.objective)(&shown)
            .into_iter()
            .map(|(name, all)| {
                RawRow::new([
                    name,
                    format!("{:.2}", all),
                    format!("{:.2}", all * 0.6),
                    format!("{:.2}", all * 0.4),
                ])
            })
            .collect()
    }

    fn is_busy(&self) -> bool {
        let state = self.lock();
        if self.behavior.hang {
            return !state.history.is_empty();
        }
        state.busy_until.is_some_and(|until| Instant::now() < until)
    }
}

#[async_trait]
impl ReportSource for MockHost {
    async fn headers(&self) -> Result<Vec<String>, HostError> {
        let mut state = self.lock();
        if state.header_failures > 0 {
            state.header_failures -= 1;
            return Err(HostError::ElementNotFound {
                what: "performance headers".to_string(),
            });
        }
        Ok(["Title", "All", "Long", "Short"].map(String::from).to_vec())
    }

    async fn rows(&self) -> Result<Vec<RawRow>, HostError> {
        Ok(self.render())
    }

    async fn text(&self) -> Result<String, HostError> {
        Ok(self
            .render()
            .iter()
            .map(|row| row.cells.join(" "))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl ReportIndicators for MockHost {
    async fn stale_notice_visible(&self) -> bool {
        self.lock().stale
    }

    async fn click_update_report(&self) -> Result<(), HostError> {
        let mut state = self.lock();
        if !state.stale {
            return Err(HostError::ElementNotFound {
                what: "update report button".to_string(),
            });
        }
        state.stale = false;
        state.shown = state.applied.clone();
        state.notifications.push(UPDATED_NOTIFICATION.to_string());
        drop(state);
        if self.behavior.mark_changed {
            self.session.mark_report_changed();
        }
        Ok(())
    }

    async fn notifications(&self) -> Vec<String> {
        self.lock().notifications.clone()
    }

    async fn progress_visible(&self) -> bool {
        self.is_busy()
    }

    async fn ready_visible(&self) -> bool {
        let applied = !self.lock().history.is_empty();
        applied && !self.is_busy()
    }

    async fn error_visible(&self) -> bool {
        self.lock().errored
    }
}

#[async_trait]
impl HostAdapter for MockHost {
    fn session(&self) -> &HostSession {
        &self.session
    }

    async fn strategy_definition(&self) -> Result<StrategyDefinition, HostError> {
        Ok(self.definition.clone())
    }

    async fn apply_parameters(
        &self,
        strategy_name: &str,
        assignment: &ParameterAssignment,
    ) -> Result<bool, HostError> {
        if strategy_name != self.definition.name {
            return Err(HostError::ElementNotFound {
                what: format!("strategy \"{}\"", strategy_name),
            });
        }
        debug!("MockHost: applying {}", assignment);
        let mut state = self.lock();
        state.applied = assignment.expand(&state.applied);
        state.history.push(assignment.clone());
        state.notifications.clear();
        state.errored = self.behavior.error_after_apply;
        if self.behavior.stale_until_clicked {
            state.stale = true;
        } else {
            state.shown = state.applied.clone();
            state.busy_until = Some(Instant::now() + self.behavior.compute_time);
        }
        drop(state);
        if self.behavior.mark_changed && !self.behavior.stale_until_clicked {
            self.session.mark_report_changed();
        }
        Ok(!self.behavior.partial_apply)
    }

    async fn change_timeframe(&self, timeframe: &str) -> Result<(), HostError> {
        self.lock().timeframe = Some(timeframe.to_string());
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.behavior
            .cancel_after_applies
            .is_some_and(|limit| self.lock().history.len() >= limit)
    }
}
