use std::collections::BTreeMap;
use std::sync::Arc;
use strategy_optimizer::application::optimization::timeframe::sweep;
use strategy_optimizer::application::optimization::{OptimizationRequest, Optimizer, ProgressUpdate};
use strategy_optimizer::config::Config;
use strategy_optimizer::domain::optimization::{
    OptimizationMethod, ParamValue, ParameterAssignment, ParameterSpace, StopReason,
};
use strategy_optimizer::domain::ports::StrategyDefinition;
use strategy_optimizer::infrastructure::{MockBehavior, MockHost};
use tokio::sync::mpsc;

fn config(method: OptimizationMethod, cycles: usize) -> Config {
    let mut config = Config::default();
    config.optimization.method = method;
    config.optimization.cycles = cycles;
    config.optimization.backtest_delay = 0.0;
    config.optimization.seed = Some(7);
    config
}

fn length_space(values: &[i64]) -> ParameterSpace {
    let mut params = BTreeMap::new();
    params.insert(
        "Length".to_string(),
        values.iter().map(|v| ParamValue::Int(*v)).collect(),
    );
    ParameterSpace::new(params).unwrap()
}

fn length(assignment: &ParameterAssignment) -> f64 {
    assignment.get("Length").and_then(ParamValue::as_f64).unwrap_or(0.0)
}

fn definition(current: i64, default: Option<i64>) -> StrategyDefinition {
    StrategyDefinition {
        name: "Demo".to_string(),
        current: ParameterAssignment::new().with("Length", current),
        default: default.map(|d| ParameterAssignment::new().with("Length", d)),
    }
}

/// Net profit equals the length.
fn identity_host(current: i64, default: Option<i64>) -> MockHost {
    MockHost::with_net_profit(definition(current, default), length)
}

#[tokio::test(start_paused = true)]
async fn test_baseline_picks_the_best_start_values() {
    let host = identity_host(10, Some(15));
    let optimizer = Optimizer::new(&config(OptimizationMethod::Random, 0));
    let request = OptimizationRequest::new(length_space(&[10, 12, 15]))
        .with_best(ParameterAssignment::new().with("Length", 12));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(run.init_best_value, Some(15.0));
    assert_eq!(run.best_value, Some(15.0));
    assert_eq!(run.best_assignment.get("Length"), Some(&ParamValue::Int(15)));
    assert_eq!(run.performance_summary.len(), 1);
    let comment = run.performance_summary[0].report.comment.clone().unwrap_or_default();
    assert!(comment.starts_with("Default parameters."));
    // Default and saved best were applied; current was only read.
    assert_eq!(host.apply_count(), 2);
    assert_eq!(run.stop_reason, Some(StopReason::BudgetReached));
}

#[tokio::test(start_paused = true)]
async fn test_skip_init_best_result_ignores_saved_best() {
    let host = identity_host(10, None);
    let mut config = config(OptimizationMethod::Random, 0);
    config.optimization.skip_init_best_result = true;
    let optimizer = Optimizer::new(&config);
    let request = OptimizationRequest::new(length_space(&[10, 40]))
        .with_best(ParameterAssignment::new().with("Length", 40));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(run.init_best_value, Some(10.0));
    assert_eq!(host.apply_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_between_cycles() {
    let host = identity_host(10, None).with_behavior(MockBehavior {
        cancel_after_applies: Some(3),
        ..MockBehavior::default()
    });
    let optimizer = Optimizer::new(&config(OptimizationMethod::BruteForce, 10));
    let request = OptimizationRequest::new(length_space(&[10, 20, 30, 40, 50]));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(run.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(run.completed_cycles, 3);
    assert_eq!(run.performance_summary.len(), 4);
    assert_eq!(run.best_value, Some(30.0));
    assert_eq!(host.apply_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_filtered_results_never_become_best() {
    let host = MockHost::new(
        definition(10, None),
        Arc::new(|assignment: &ParameterAssignment| {
            let length = length(assignment);
            let (profit, trades) = if length > 10.0 { (50.0, 30.0) } else { (10.0, 100.0) };
            vec![
                ("Net profit".to_string(), profit),
                ("Total trades".to_string(), trades),
            ]
        }),
    );
    let mut config = config(OptimizationMethod::BruteForce, 2);
    config.optimization.filter_ascending = Some(true);
    config.optimization.filter_value = 50.0;
    let optimizer = Optimizer::new(&config);
    let request = OptimizationRequest::new(length_space(&[10, 20]));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(run.best_value, Some(10.0));
    assert_eq!(run.filtered_summary.len(), 1);
    let comment = run.filtered_summary[0].report.comment.clone().unwrap_or_default();
    assert!(comment.starts_with("Skipped for \"Total trades: All\": 30.00."));
    assert!(!run.is_improved());
}

#[tokio::test(start_paused = true)]
async fn test_brute_force_stops_when_space_is_covered() {
    let host = identity_host(10, None);
    let optimizer = Optimizer::new(&config(OptimizationMethod::BruteForce, 10));
    let request = OptimizationRequest::new(length_space(&[10, 20]));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(run.stop_reason, Some(StopReason::SpaceExhausted));
    assert_eq!(run.completed_cycles, 2);
    assert_eq!(run.best_value, Some(20.0));
    assert!(run.is_improved());
}

#[tokio::test(start_paused = true)]
async fn test_sequential_skips_values_equal_to_best_without_host_calls() {
    let host = identity_host(10, None);
    let optimizer = Optimizer::new(&config(OptimizationMethod::Sequential, 3));
    let request = OptimizationRequest::new(length_space(&[10, 20, 30]));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(host.apply_count(), 2);
    assert_eq!(run.completed_cycles, 3);
    assert_eq!(run.best_value, Some(30.0));
    assert_eq!(run.best_assignment.get("Length"), Some(&ParamValue::Int(30)));
}

#[tokio::test(start_paused = true)]
async fn test_host_errors_are_recorded_as_failures() {
    let host = identity_host(10, None).with_behavior(MockBehavior {
        error_after_apply: true,
        ..MockBehavior::default()
    });
    let optimizer = Optimizer::new(&config(OptimizationMethod::BruteForce, 2));
    let request = OptimizationRequest::new(length_space(&[20, 30]));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert_eq!(run.failed_summary.len(), 2);
    assert_eq!(run.performance_summary.len(), 1);
    assert_eq!(run.best_value, Some(10.0));
    let comment = run.failed_summary[0].report.comment.clone().unwrap_or_default();
    assert!(comment.contains("reported an error"));
}

#[tokio::test(start_paused = true)]
async fn test_partially_applied_parameters_still_count() {
    let host = identity_host(10, None).with_behavior(MockBehavior {
        partial_apply: true,
        ..MockBehavior::default()
    });
    let optimizer = Optimizer::new(&config(OptimizationMethod::BruteForce, 3));
    let request = OptimizationRequest::new(length_space(&[10, 20, 30]));

    let run = optimizer.run(&host, &request).await.unwrap();

    assert!(run.failed_summary.is_empty());
    assert!(run.performance_summary.len() > 1);
    assert_eq!(run.best_value, Some(30.0));
    let comment = run.performance_summary.last().unwrap().report.comment.clone().unwrap_or_default();
    assert!(comment.starts_with("Some strategy parameters could not be set."), "{}", comment);
}

#[tokio::test(start_paused = true)]
async fn test_annealing_stays_in_space_and_never_loses_the_best() {
    let mut params = BTreeMap::new();
    params.insert("Fast".to_string(), (1..=9).map(ParamValue::Int).collect());
    params.insert("Slow".to_string(), (10..=50).step_by(10).map(ParamValue::Int).collect());
    let space = ParameterSpace::new(params).unwrap();
    let host = MockHost::with_net_profit(
        StrategyDefinition {
            name: "Demo".to_string(),
            current: ParameterAssignment::new().with("Fast", 1).with("Slow", 10),
            default: None,
        },
        |a| {
            let fast = a.get("Fast").and_then(ParamValue::as_f64).unwrap_or(0.0);
            let slow = a.get("Slow").and_then(ParamValue::as_f64).unwrap_or(0.0);
            100.0 - (fast - 5.0).powi(2) - (slow - 30.0).powi(2) / 10.0
        },
    );
    let optimizer = Optimizer::new(&config(OptimizationMethod::Annealing, 15));

    let run = optimizer.run(&host, &OptimizationRequest::new(space.clone())).await.unwrap();

    assert_eq!(run.completed_cycles, 15);
    let init = run.init_best_value.unwrap();
    assert!(run.best_value.unwrap() >= init);
    for applied in host.applied_history() {
        for (name, value) in applied.iter() {
            assert!(space.index_of(name, value).is_some(), "{} = {} is outside the space", name, value);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_reported_every_cycle() {
    let host = identity_host(10, None);
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let optimizer = Optimizer::new(&config(OptimizationMethod::Sequential, 3)).with_progress(tx);

    optimizer
        .run(&host, &OptimizationRequest::new(length_space(&[10, 20, 30])))
        .await
        .unwrap();
    drop(optimizer);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.len(), 3);
    assert!(updates[0].message.contains("is skipped"));
    assert_eq!(updates[2].cycle, 3);
    assert_eq!(updates[2].best_value, Some(30.0));
    assert!(updates[2].message.starts_with("Cycle: 3/3"));
    assert!(updates[1].message.contains("Current \"Net profit: All\": 20.00. Best \"Net profit: All\": 20.00"));
    assert!(updates[2].message.ends_with("Current \"Net profit: All\": 30.00. Best \"Net profit: All\": 30.00"));
}

#[tokio::test(start_paused = true)]
async fn test_best_parameters_are_applied_and_verified() {
    let host = identity_host(10, None);
    let optimizer = Optimizer::new(&config(OptimizationMethod::BruteForce, 5));
    let run = optimizer
        .run(&host, &OptimizationRequest::new(length_space(&[10, 20, 30])))
        .await
        .unwrap();

    assert!(optimizer.apply_best_and_verify(&host, &run).await.unwrap());
    let last = host.applied_history().pop().unwrap();
    assert_eq!(last.get("Length"), Some(&ParamValue::Int(30)));
}

#[tokio::test(start_paused = true)]
async fn test_timeframe_sweep_runs_every_timeframe() {
    let host = identity_host(10, None);
    let optimizer = Optimizer::new(&config(OptimizationMethod::BruteForce, 3));
    let request = OptimizationRequest::new(length_space(&[10, 20]))
        .with_best(ParameterAssignment::new().with("Length", 20));
    let timeframes = vec!["1h".to_string(), "4h".to_string()];

    let result = sweep(&optimizer, &host, &request, &timeframes).await.unwrap();

    assert!(!result.cancelled);
    assert_eq!(result.runs.len(), 2);
    assert_eq!(result.runs[0].timeframe.as_deref(), Some("1h"));
    assert_eq!(result.runs[1].timeframe.as_deref(), Some("4h"));
    assert!(result.runs.iter().all(|run| run.start.best.is_none()));
    assert_eq!(host.timeframe().as_deref(), Some("4h"));
    assert!(result.best().is_some());
}
