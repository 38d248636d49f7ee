use crate::domain::errors::HostError;
use crate::domain::optimization::parameter::ParameterAssignment;
use crate::domain::session::HostSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One rendered row of the host performance table, first cell is the row name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.cells.first().map(String::as_str)
    }
}

/// A secondary report table, such as trade analysis or ratios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Strategy currently attached to the chart and its input values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub name: String,
    pub current: ParameterAssignment,
    #[serde(default)]
    pub default: Option<ParameterAssignment>,
}

/// Raw access to the rendered performance report.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Column headers of the metrics table; the first one names the row column.
    async fn headers(&self) -> Result<Vec<String>, HostError>;
    async fn rows(&self) -> Result<Vec<RawRow>, HostError>;
    /// Whole report text, scanned when the table cannot be read cell by cell.
    async fn text(&self) -> Result<String, HostError>;

    async fn extra_tables(&self) -> Result<Vec<RawTable>, HostError> {
        Ok(Vec::new())
    }
}

/// Observable signals around a report recomputation.
#[async_trait]
pub trait ReportIndicators: Send + Sync {
    /// The host shows a notice that the report no longer matches the inputs.
    async fn stale_notice_visible(&self) -> bool;
    async fn click_update_report(&self) -> Result<(), HostError>;
    /// Texts of the notifications currently on screen.
    async fn notifications(&self) -> Vec<String>;
    async fn progress_visible(&self) -> bool;
    async fn ready_visible(&self) -> bool;
    async fn error_visible(&self) -> bool;
}

/// Everything the optimizer needs from the charting host.
#[async_trait]
pub trait HostAdapter: ReportSource + ReportIndicators {
    fn session(&self) -> &HostSession;

    async fn strategy_definition(&self) -> Result<StrategyDefinition, HostError>;

    /// Applies input values. `Ok(false)` means some inputs could not be set.
    async fn apply_parameters(
        &self,
        strategy_name: &str,
        assignment: &ParameterAssignment,
    ) -> Result<bool, HostError>;

    async fn change_timeframe(&self, timeframe: &str) -> Result<(), HostError> {
        Err(HostError::Unsupported {
            operation: format!("change timeframe to {}", timeframe),
        })
    }

    /// The user asked the run to stop.
    fn is_cancelled(&self) -> bool;
}
