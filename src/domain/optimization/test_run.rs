//! Aggregated state of one optimization run.

use crate::domain::errors::SetupError;
use crate::domain::optimization::parameter::ParameterAssignment;
use crate::domain::optimization::report::{PerformanceReport, format_value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Search strategy used to pick the next candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizationMethod {
    #[serde(rename = "random", alias = "Random")]
    Random,
    #[serde(
        rename = "random improvement",
        alias = "random_improvement",
        alias = "random-improvement"
    )]
    RandomImprovement,
    #[serde(rename = "annealing", alias = "Annealing")]
    Annealing,
    #[serde(rename = "sequential", alias = "Sequential")]
    Sequential,
    #[serde(rename = "brute force", alias = "brute_force", alias = "brute-force")]
    BruteForce,
}

impl OptimizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMethod::Random => "random",
            OptimizationMethod::RandomImprovement => "random improvement",
            OptimizationMethod::Annealing => "annealing",
            OptimizationMethod::Sequential => "sequential",
            OptimizationMethod::BruteForce => "brute force",
        }
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationMethod {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "random" => Ok(OptimizationMethod::Random),
            "random improvement" => Ok(OptimizationMethod::RandomImprovement),
            "annealing" => Ok(OptimizationMethod::Annealing),
            "sequential" => Ok(OptimizationMethod::Sequential),
            "brute force" => Ok(OptimizationMethod::BruteForce),
            other => Err(SetupError::InvalidConfig {
                reason: format!("unknown optimization method \"{}\"", other),
            }),
        }
    }
}

/// Excludes iterations whose filter metric falls on the wrong side of a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFilter {
    pub metric: String,
    pub ascending: bool,
    pub value: f64,
}

impl MetricFilter {
    /// Returns the rejection comment when the report fails the filter.
    ///
    /// Reports that do not carry the filter metric at all pass.
    pub fn rejects(&self, report: &PerformanceReport) -> Option<String> {
        let value = report.get(&self.metric)?;
        let rejected = match value.as_f64() {
            None => true,
            Some(v) if self.ascending => v < self.value,
            Some(v) => v > self.value,
        };
        rejected.then(|| format!("Skipped for \"{}\": {}.", self.metric, format_value(value.as_f64())))
    }
}

/// Assignments known when the run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartParams {
    pub current: ParameterAssignment,
    pub default: Option<ParameterAssignment>,
    pub best: Option<ParameterAssignment>,
}

/// One evaluated assignment and its report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// `None` for the baseline evaluation.
    pub cycle: Option<usize>,
    pub assignment: ParameterAssignment,
    pub report: PerformanceReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    BudgetReached,
    SpaceExhausted,
    Cancelled,
}

/// Where a recorded iteration ended up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordOutcome {
    Improved { previous: Option<f64>, value: f64 },
    Kept { value: f64 },
    Filtered { value: Option<f64> },
    MissingTarget,
}

impl RecordOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            RecordOutcome::Improved { value, .. } | RecordOutcome::Kept { value } => Some(*value),
            RecordOutcome::Filtered { value } => *value,
            RecordOutcome::MissingTarget => None,
        }
    }

    pub fn improved(&self) -> bool {
        matches!(self, RecordOutcome::Improved { .. })
    }
}

/// Accumulated results of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub strategy_name: String,
    pub timeframe: Option<String>,
    pub method: OptimizationMethod,
    pub is_maximizing: bool,
    pub target_metric: String,
    pub cycles: usize,
    pub filter: Option<MetricFilter>,
    /// Parameters under optimization, most important first.
    pub priority: Vec<String>,
    pub start: StartParams,
    pub performance_summary: Vec<IterationRecord>,
    pub filtered_summary: Vec<IterationRecord>,
    pub failed_summary: Vec<IterationRecord>,
    pub best_value: Option<f64>,
    pub best_assignment: ParameterAssignment,
    pub init_best_value: Option<f64>,
    pub completed_cycles: usize,
    pub stop_reason: Option<StopReason>,
}

impl TestRun {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy_name: impl Into<String>,
        method: OptimizationMethod,
        is_maximizing: bool,
        target_metric: impl Into<String>,
        cycles: usize,
        filter: Option<MetricFilter>,
        priority: Vec<String>,
        start: StartParams,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            strategy_name: strategy_name.into(),
            timeframe: None,
            method,
            is_maximizing,
            target_metric: target_metric.into(),
            cycles,
            filter,
            priority,
            best_assignment: start.current.clone(),
            start,
            performance_summary: Vec::new(),
            filtered_summary: Vec::new(),
            failed_summary: Vec::new(),
            best_value: None,
            init_best_value: None,
            completed_cycles: 0,
            stop_reason: None,
        }
    }

    /// Strict comparison in the configured direction. Anything beats no value.
    pub fn is_better(&self, candidate: f64, current: Option<f64>) -> bool {
        match current {
            None => true,
            Some(current) if self.is_maximizing => candidate > current,
            Some(current) => candidate < current,
        }
    }

    /// Stores the winning baseline evaluation as the initial best.
    pub fn record_baseline(&mut self, assignment: ParameterAssignment, report: PerformanceReport, value: f64) {
        self.best_value = Some(value);
        self.init_best_value = Some(value);
        self.best_assignment = assignment.clone();
        self.performance_summary.push(IterationRecord {
            cycle: None,
            assignment,
            report,
        });
    }

    /// Files an evaluated iteration and updates the best result.
    pub fn record(
        &mut self,
        cycle: usize,
        assignment: ParameterAssignment,
        mut report: PerformanceReport,
    ) -> RecordOutcome {
        let Some(value) = report.target_value(&self.target_metric) else {
            report.append_comment(&format!("{} missed in data", self.target_metric));
            self.failed_summary.push(IterationRecord {
                cycle: Some(cycle),
                assignment,
                report,
            });
            return RecordOutcome::MissingTarget;
        };

        if let Some(reason) = self.filter.as_ref().and_then(|f| f.rejects(&report)) {
            report.prepend_comment(&reason);
            self.filtered_summary.push(IterationRecord {
                cycle: Some(cycle),
                assignment,
                report,
            });
            return RecordOutcome::Filtered { value: Some(value) };
        }

        let outcome = if self.is_better(value, self.best_value) {
            let previous = self.best_value;
            self.best_value = Some(value);
            self.best_assignment = assignment.clone();
            RecordOutcome::Improved { previous, value }
        } else {
            RecordOutcome::Kept { value }
        };
        self.performance_summary.push(IterationRecord {
            cycle: Some(cycle),
            assignment,
            report,
        });
        outcome
    }

    /// Keeps an iteration that could not be evaluated for the audit trail.
    pub fn record_failure(&mut self, cycle: usize, assignment: ParameterAssignment, report: PerformanceReport) {
        self.failed_summary.push(IterationRecord {
            cycle: Some(cycle),
            assignment,
            report,
        });
    }

    /// Best accepted record, scanning every recorded iteration.
    pub fn best_record(&self) -> Option<&IterationRecord> {
        let mut best: Option<(&IterationRecord, f64)> = None;
        for record in &self.performance_summary {
            let Some(value) = record.report.target_value(&self.target_metric) else {
                continue;
            };
            if best.is_none_or(|(_, current)| self.is_better(value, Some(current))) {
                best = Some((record, value));
            }
        }
        best.map(|(record, _)| record)
    }

    pub fn is_improved(&self) -> bool {
        match (self.best_value, self.init_best_value) {
            (Some(best), Some(init)) => best != init,
            (Some(_), None) => true,
            _ => false,
        }
    }
}
