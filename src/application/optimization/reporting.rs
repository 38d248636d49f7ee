//! Console output for optimization runs.

use crate::domain::optimization::parameter::ParameterSpace;
use crate::domain::optimization::report::format_value;
use crate::domain::optimization::test_run::{IterationRecord, OptimizationMethod, TestRun};

/// Metrics shown next to the target in the results table when present.
const SUMMARY_METRICS: [&str; 3] = ["Total trades: All", "Percent profitable: All", "Max equity drawdown"];

pub struct OptimizeReporter {
    top_n: usize,
}

impl Default for OptimizeReporter {
    fn default() -> Self {
        Self::new(10)
    }
}

impl OptimizeReporter {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn print_space_info(&self, space: &ParameterSpace, method: OptimizationMethod, priority: &[String]) {
        println!("\n📊 Parameter Space:");
        for (name, values) in space.iter() {
            let shown: Vec<String> = values.iter().take(8).map(ToString::to_string).collect();
            let more = if values.len() > shown.len() { ", ..." } else { "" };
            println!("  {:<24} {:>4} value(s): [{}{}]", name, values.len(), shown.join(", "), more);
        }
        println!("\n  Priority:       {}", space.priority(priority).join(", "));
        println!("  Combinations:   {}", space.combinations());
        println!("🔢 Evaluations to cover the space with {}: {}", method, space.size_for(method));
    }

    /// Top records sorted by the target metric in the run's direction.
    pub fn ranked<'a>(&self, run: &'a TestRun) -> Vec<(&'a IterationRecord, f64)> {
        let mut ranked: Vec<(&IterationRecord, f64)> = run
            .performance_summary
            .iter()
            .filter_map(|r| r.report.target_value(&run.target_metric).map(|v| (r, v)))
            .collect();
        ranked.sort_by(|a, b| {
            let order = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
            if run.is_maximizing { order.reverse() } else { order }
        });
        ranked.truncate(self.top_n);
        ranked
    }

    pub fn print_results_table(&self, run: &TestRun) {
        let ranked = self.ranked(run);
        println!("\n{}", "=".repeat(100));
        println!(
            "✅ OPTIMIZATION COMPLETE - {} {} - Top {} of {} ({} filtered, {} failed)",
            run.strategy_name,
            run.timeframe.as_deref().unwrap_or(""),
            ranked.len(),
            run.performance_summary.len(),
            run.filtered_summary.len(),
            run.failed_summary.len()
        );
        println!("{}", "=".repeat(100));
        println!(
            "{:<4} | {:>6} | {:>14} | {:>12} | {:>12} | {:>12} | Parameters",
            "#", "Cycle", run.target_metric, "Trades", "Profitable", "Drawdown"
        );
        println!("{}", "-".repeat(100));
        for (i, (record, value)) in ranked.iter().enumerate() {
            let cycle = record
                .cycle
                .map(|c| (c + 1).to_string())
                .unwrap_or_else(|| "init".to_string());
            let extra: Vec<String> = SUMMARY_METRICS
                .iter()
                .map(|m| format_value(record.report.number(m)))
                .collect();
            println!(
                "{:<4} | {:>6} | {:>14} | {:>12} | {:>12} | {:>12} | {}",
                i + 1,
                cycle,
                format_value(Some(*value)),
                extra[0],
                extra[1],
                extra[2],
                optimized_values(record, &run.priority)
            );
        }
        println!("{}\n", "=".repeat(100));
    }

    pub fn print_best(&self, run: &TestRun) {
        println!("🏆 BEST RESULT:");
        println!("  {:<16} {}", format!("{}:", run.target_metric), format_value(run.best_value));
        println!("  {:<16} {}", "Initial:", format_value(run.init_best_value));
        println!("  {:<16} {}", "Cycles:", run.completed_cycles);
        if let Some(reason) = run.stop_reason {
            println!("  {:<16} {:?}", "Stopped:", reason);
        }
        for (name, value) in run.best_assignment.iter() {
            println!("  {:<16} {}", format!("{}:", name), value);
        }
        if let Some(notice) = improvement_notice(run) {
            println!("\n⚠️  {}", notice);
        }
        println!("{}\n", "=".repeat(100));
    }
}

fn optimized_values(record: &IterationRecord, names: &[String]) -> String {
    names
        .iter()
        .filter_map(|name| record.assignment.get(name).map(|v| format!("{}: {}", name, v)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Shown when no cycle beat the baseline.
pub fn improvement_notice(run: &TestRun) -> Option<String> {
    if run.init_best_value.is_none() || run.is_improved() {
        return None;
    }
    Some(format!(
        "The \"{}\" value was not improved from the initial value {}.",
        run.target_metric,
        format_value(run.init_best_value)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::parameter::ParameterAssignment;
    use crate::domain::optimization::report::{MetricValue, PerformanceReport};
    use crate::domain::optimization::test_run::StartParams;

    fn report(value: f64) -> PerformanceReport {
        let mut report = PerformanceReport::new();
        report.insert("Net profit: All", MetricValue::Number(value));
        report
    }

    fn run(is_maximizing: bool) -> TestRun {
        let mut run = TestRun::new(
            "Demo",
            OptimizationMethod::Random,
            is_maximizing,
            "Net profit: All",
            5,
            None,
            vec!["A".to_string()],
            StartParams {
                current: ParameterAssignment::new().with("A", 1),
                default: None,
                best: None,
            },
        );
        run.record_baseline(ParameterAssignment::new().with("A", 1), report(10.0), 10.0);
        run
    }

    #[test]
    fn test_ranked_follows_direction() {
        let mut maximizing = run(true);
        maximizing.record(0, ParameterAssignment::new().with("A", 2), report(30.0));
        maximizing.record(1, ParameterAssignment::new().with("A", 3), report(20.0));
        let reporter = OptimizeReporter::new(2);
        let values: Vec<f64> = reporter.ranked(&maximizing).iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![30.0, 20.0]);

        let mut minimizing = run(false);
        minimizing.record(0, ParameterAssignment::new().with("A", 2), report(30.0));
        minimizing.record(1, ParameterAssignment::new().with("A", 3), report(5.0));
        let values: Vec<f64> = reporter.ranked(&minimizing).iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![5.0, 10.0]);
    }

    #[test]
    fn test_notice_when_not_improved() {
        let mut run = run(true);
        run.record(0, ParameterAssignment::new().with("A", 2), report(4.0));
        assert_eq!(
            improvement_notice(&run).unwrap(),
            "The \"Net profit: All\" value was not improved from the initial value 10.00."
        );
        run.record(1, ParameterAssignment::new().with("A", 3), report(12.0));
        assert_eq!(improvement_notice(&run), None);
    }
}
