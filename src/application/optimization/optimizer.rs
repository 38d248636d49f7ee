//! The optimization loop.
//!
//! One [`Optimizer::run`] establishes the baseline from the strategy's
//! current, default and previously best values, then asks the configured
//! strategy for a candidate every cycle, evaluates it on the host and keeps
//! the best result. It stops at the cycle budget, when the strategy runs out
//! of candidates, or when the host reports a cancellation.

use crate::application::optimization::evaluator::{Evaluation, IterationEvaluator};
use crate::application::optimization::parser::ReportParser;
use crate::application::optimization::scheduler::DelayScheduler;
use crate::application::optimization::strategies::{Observation, Proposal, next_candidate, observe};
use crate::application::optimization::synchronizer::{ReportSynchronizer, SyncStatus};
use crate::config::{Config, OptimizationConfig};
use crate::domain::errors::{OptimizerError, SetupError};
use crate::domain::optimization::parameter::{ParameterAssignment, ParameterSpace};
use crate::domain::optimization::report::{PerformanceReport, format_value};
use crate::domain::optimization::state::OptimizationState;
use crate::domain::optimization::test_run::{RecordOutcome, StartParams, StopReason, TestRun};
use crate::domain::ports::HostAdapter;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Above this ratio of space size to cycles the run covers little of the space.
const SPACE_TO_CYCLES_WARNING: u128 = 10;
const VERIFY_ATTEMPTS: usize = 3;

/// What to optimize in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    pub space: ParameterSpace,
    /// Likely impactful parameters first; filtered to the space.
    pub priority: Vec<String>,
    /// Best assignment kept from a previous session.
    pub best: Option<ParameterAssignment>,
    pub timeframe: Option<String>,
}

impl OptimizationRequest {
    pub fn new(space: ParameterSpace) -> Self {
        Self {
            space,
            priority: Vec::new(),
            best: None,
            timeframe: None,
        }
    }

    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_best(mut self, best: ParameterAssignment) -> Self {
        self.best = Some(best);
        self
    }
}

/// Progress of a running optimization, one per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub cycle: usize,
    pub cycles: usize,
    pub current_value: Option<f64>,
    pub best_value: Option<f64>,
    pub message: String,
}

struct CycleClock {
    total_secs: f64,
    evaluated: usize,
}

impl CycleClock {
    fn new() -> Self {
        Self {
            total_secs: 0.0,
            evaluated: 0,
        }
    }

    fn add(&mut self, secs: f64) -> f64 {
        self.total_secs += secs;
        self.evaluated += 1;
        ((self.total_secs / self.evaluated as f64) * 10.0).round() / 10.0
    }
}

pub struct Optimizer {
    config: OptimizationConfig,
    evaluator: IterationEvaluator,
    scheduler: DelayScheduler,
    progress: Option<UnboundedSender<ProgressUpdate>>,
}

impl Optimizer {
    pub fn new(config: &Config) -> Self {
        let parser = ReportParser::new(config.retry.clone());
        let synchronizer = ReportSynchronizer::new(config.synchronizer.clone(), parser);
        let optimization = config.optimization.clone();
        Self {
            evaluator: IterationEvaluator::new(synchronizer, optimization.data_loading_timeout()),
            scheduler: DelayScheduler::new(optimization.delay(), optimization.random_delay),
            config: optimization,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn emit(&self, update: ProgressUpdate) {
        info!("Optimizer: {}", update.message);
        if let Some(sender) = &self.progress {
            if sender.send(update).is_err() {
                debug!("Optimizer: progress receiver dropped");
            }
        }
    }

    /// Runs one optimization against `host`.
    ///
    /// Setup and baseline failures abort the run. Failures inside a cycle are
    /// recorded on that cycle and the loop continues.
    pub async fn run<H>(&self, host: &H, request: &OptimizationRequest) -> Result<TestRun, OptimizerError>
    where
        H: HostAdapter + ?Sized,
    {
        let mut rng = self.rng();
        let config = &self.config;
        let space = &request.space;
        space.validate()?;

        let definition = host
            .strategy_definition()
            .await
            .map_err(|e| SetupError::DefinitionsUnavailable { reason: e.to_string() })?;
        if definition.current.is_empty() {
            return Err(SetupError::CurrentValuesUnavailable.into());
        }

        let mut run = TestRun::new(
            definition.name,
            config.method,
            config.is_maximizing,
            config.target_metric.clone(),
            config.cycles,
            config.filter(),
            space.priority(&request.priority),
            StartParams {
                current: definition.current,
                default: definition.default,
                best: request.best.clone(),
            },
        );
        run.timeframe = request.timeframe.clone();

        let size = space.size_for(config.method);
        info!(
            "Optimizer: {} \"{}\" by {} over {} parameter(s), {} combination(s), {} cycle(s)",
            if config.is_maximizing { "maximizing" } else { "minimizing" },
            config.target_metric,
            config.method,
            space.len(),
            size,
            config.cycles
        );
        if size / (config.cycles.max(1) as u128) > SPACE_TO_CYCLES_WARNING {
            warn!(
                "Optimizer: the search space has {} combinations, more than {} times the {} cycles",
                size, SPACE_TO_CYCLES_WARNING, config.cycles
            );
        }

        self.establish_baseline(host, &mut run, &mut rng).await?;

        let mut state = OptimizationState::for_method(config.method, config.random_without_replacement);
        let mut clock = CycleClock::new();
        let mut last_value = run.best_value;
        let mut stop = StopReason::BudgetReached;

        for cycle in 0..config.cycles {
            if host.is_cancelled() {
                info!("Optimizer: cancelled before cycle {}", cycle + 1);
                stop = StopReason::Cancelled;
                break;
            }
            self.scheduler.wait(&mut rng).await;

            let candidate = match next_candidate(&mut state, space, &run, &mut rng) {
                Proposal::Exhausted => {
                    info!("Optimizer: search space exhausted after {} cycle(s)", cycle);
                    stop = StopReason::SpaceExhausted;
                    break;
                }
                Proposal::Skip { message } => {
                    run.completed_cycles = cycle + 1;
                    self.emit(ProgressUpdate {
                        cycle: cycle + 1,
                        cycles: config.cycles,
                        current_value: run.best_value,
                        best_value: run.best_value,
                        message: format!(
                            "Cycle: {}/{}. {}. Best \"{}\": {}",
                            cycle + 1,
                            config.cycles,
                            message,
                            config.target_metric,
                            format_value(run.best_value)
                        ),
                    });
                    continue;
                }
                Proposal::Evaluate(candidate) => candidate,
            };

            let started = Instant::now();
            let evaluation = self
                .evaluator
                .evaluate(
                    host,
                    &run.strategy_name,
                    &candidate.assignment,
                    &config.target_metric,
                    last_value,
                    false,
                )
                .await;

            let (value, improved, set_secs, parse_secs) = match evaluation {
                Ok(Evaluation { status, mut report }) => {
                    report.append_comment(&candidate.message);
                    let timing = report.timing;
                    if status != SyncStatus::Ready {
                        run.record_failure(cycle, candidate.assignment.clone(), report);
                        (None, false, timing.set_secs, timing.parse_secs)
                    } else {
                        match run.record(cycle, candidate.assignment.clone(), report) {
                            RecordOutcome::Improved { value, .. } => {
                                last_value = Some(value);
                                (Some(value), true, timing.set_secs, timing.parse_secs)
                            }
                            RecordOutcome::Kept { value } => {
                                last_value = Some(value);
                                (Some(value), false, timing.set_secs, timing.parse_secs)
                            }
                            RecordOutcome::Filtered { .. } | RecordOutcome::MissingTarget => {
                                (None, false, timing.set_secs, timing.parse_secs)
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Optimizer: cycle {} failed: {}", cycle + 1, e);
                    let mut report = PerformanceReport::new();
                    report.append_comment(&e.to_string());
                    report.append_comment(&candidate.message);
                    run.record_failure(cycle, candidate.assignment.clone(), report);
                    (None, false, 0.0, 0.0)
                }
            };

            observe(
                &mut state,
                &run,
                Observation {
                    assignment: &candidate.assignment,
                    value,
                    improved_best: improved,
                },
                &mut rng,
            );
            run.completed_cycles = cycle + 1;

            let duration = started.elapsed().as_secs_f64();
            let average = clock.add(duration);
            self.emit(ProgressUpdate {
                cycle: cycle + 1,
                cycles: config.cycles,
                current_value: value,
                best_value: run.best_value,
                message: format!(
                    "Cycle: {}/{} ({:.1}[{:.1}/{:.1}]/{:.1} sec). {} Current \"{}\": {}. Best \"{}\": {}",
                    cycle + 1,
                    config.cycles,
                    duration,
                    set_secs,
                    parse_secs,
                    average,
                    candidate.message,
                    config.target_metric,
                    format_value(value),
                    config.target_metric,
                    format_value(run.best_value)
                ),
            });
        }

        run.stop_reason = Some(stop);
        run.finished_at = Some(Utc::now());
        info!(
            "Optimizer: finished after {} cycle(s) ({:?}), best \"{}\" {} (initial {})",
            run.completed_cycles,
            stop,
            run.target_metric,
            format_value(run.best_value),
            format_value(run.init_best_value)
        );
        Ok(run)
    }

    async fn establish_baseline<H>(&self, host: &H, run: &mut TestRun, rng: &mut StdRng) -> Result<(), OptimizerError>
    where
        H: HostAdapter + ?Sized,
    {
        let target = self.config.target_metric.clone();
        let current = run.start.current.clone();
        let mut candidates: Vec<(ParameterAssignment, PerformanceReport)> = Vec::new();

        self.scheduler.wait(rng).await;
        let evaluation = self.evaluator.read_current(host, &target).await?;
        let mut report = evaluation.report;
        report.prepend_comment("Current parameters.");
        candidates.push((current.clone(), report));

        if let Some(default) = run.start.default.clone() {
            let default = default.expand(&current);
            if default.differs_from(&current) {
                self.scheduler.wait(rng).await;
                let mut report = self
                    .evaluator
                    .evaluate(host, &run.strategy_name, &default, &target, None, true)
                    .await?
                    .report;
                report.prepend_comment("Default parameters.");
                candidates.push((default, report));
            } else {
                debug!("Optimizer: default parameters equal the current ones");
            }
        }

        if let Some(best) = run.start.best.clone() {
            if self.config.skip_init_best_result {
                debug!("Optimizer: previous best parameters skipped");
            } else {
                let best = best.expand(&current);
                let equals_default = candidates.len() > 1 && !best.differs_from(&candidates[1].0);
                if best.differs_from(&current) && !equals_default {
                    self.scheduler.wait(rng).await;
                    let mut report = self
                        .evaluator
                        .evaluate(host, &run.strategy_name, &best, &target, None, true)
                        .await?
                        .report;
                    report.prepend_comment("Best value parameters.");
                    candidates.push((best, report));
                } else {
                    debug!("Optimizer: previous best parameters equal current or default ones");
                }
            }
        }

        let mut winner: Option<(ParameterAssignment, PerformanceReport, f64)> = None;
        for (assignment, report) in candidates {
            let Some(value) = report.target_value(&target) else {
                warn!("Optimizer: baseline report has no \"{}\"", target);
                continue;
            };
            if run.is_better(value, winner.as_ref().map(|(_, _, v)| *v)) {
                winner = Some((assignment, report, value));
            }
        }

        let Some((assignment, report, value)) = winner else {
            return Err(SetupError::BaselineUnavailable { metric: target }.into());
        };
        info!(
            "Optimizer: initial \"{}\" {} ({})",
            target,
            format_value(Some(value)),
            report.comment.as_deref().unwrap_or_default()
        );
        run.record_baseline(assignment, report, value);
        Ok(())
    }

    /// Re-applies the best parameters and checks the report reproduces the
    /// recorded value. Returns whether it did within the attempt budget.
    pub async fn apply_best_and_verify<H>(&self, host: &H, run: &TestRun) -> Result<bool, OptimizerError>
    where
        H: HostAdapter + ?Sized,
    {
        let Some(record) = run.best_record() else {
            return Ok(false);
        };
        let Some(expected) = record.report.target_value(&run.target_metric) else {
            return Ok(false);
        };
        let tolerance = (expected.abs() * 0.001).max(0.01);

        for attempt in 1..=VERIFY_ATTEMPTS {
            let evaluation = self
                .evaluator
                .evaluate(host, &run.strategy_name, &record.assignment, &run.target_metric, None, true)
                .await?;
            match evaluation.report.target_value(&run.target_metric) {
                Some(actual) if (actual - expected).abs() <= tolerance => {
                    info!(
                        "Optimizer: best parameters applied, \"{}\" {}",
                        run.target_metric,
                        format_value(Some(actual))
                    );
                    return Ok(true);
                }
                actual => warn!(
                    "Optimizer: attempt {}/{} to apply best parameters gave {} instead of {}",
                    attempt,
                    VERIFY_ATTEMPTS,
                    format_value(actual),
                    format_value(Some(expected))
                ),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_clock_averages_to_tenths() {
        let mut clock = CycleClock::new();
        assert_eq!(clock.add(1.0), 1.0);
        assert_eq!(clock.add(2.0), 1.5);
        assert_eq!(clock.add(0.44), 1.1);
    }
}
