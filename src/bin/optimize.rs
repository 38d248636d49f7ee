//! Strategy Parameter Optimizer Binary
//!
//! Runs the optimizer against the in-process simulated host, or prints what a
//! ranges file expands to.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strategy_optimizer::application::optimization::timeframe::{parse_timeframes, sweep};
use strategy_optimizer::application::optimization::{OptimizationRequest, OptimizeReporter, Optimizer, ProgressUpdate};
use strategy_optimizer::config::Config;
use strategy_optimizer::domain::optimization::report::format_value;
use strategy_optimizer::domain::optimization::{
    OptimizationMethod, ParamValue, ParameterAssignment, ParameterRange, ParameterRanges, ParameterSpace, TestRun,
};
use strategy_optimizer::domain::ports::StrategyDefinition;
use strategy_optimizer::infrastructure::export::{export_csv, export_json};
use strategy_optimizer::infrastructure::mock::Objective;
use strategy_optimizer::infrastructure::session::CONNECT_TIMEOUT;
use strategy_optimizer::infrastructure::{MockBehavior, MockHost, initialize_session};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_STRATEGY: &str = "Demo Crossover Strategy";

#[derive(Parser)]
#[command(author, version, about = "Strategy Parameter Optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a synthetic strategy on the simulated host
    Simulate {
        /// TOML config file with [optimization], [synchronizer] and [retry] sections
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// TOML file with parameter ranges (built-in demo ranges when omitted)
        #[arg(short, long)]
        ranges: Option<PathBuf>,

        /// Optimization method (random, random improvement, annealing, sequential, brute force)
        #[arg(short, long)]
        method: Option<String>,

        /// Number of cycles
        #[arg(long)]
        cycles: Option<usize>,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Comma-separated timeframes to sweep, e.g. "15m,1h,4h"
        #[arg(long)]
        timeframes: Option<String>,

        /// JSON file with the best parameters of a previous session
        #[arg(long)]
        best_file: Option<PathBuf>,

        /// Directory for CSV and JSON results
        #[arg(short, long, default_value = "optimization_results")]
        output: PathBuf,

        /// Ticker used in the results file name
        #[arg(long, default_value = "SIM:DEMO")]
        ticker: String,

        /// Multiplier for every synchronizer wait; the simulated host is fast
        #[arg(long, default_value = "0.05")]
        time_scale: f64,

        /// Number of top results to display
        #[arg(short, long, default_value = "10")]
        top_n: usize,
    },
    /// Print the parameter space described by a ranges file
    Space {
        /// TOML file with parameter ranges
        #[arg(short, long)]
        ranges: PathBuf,

        /// Optimization method used for the evaluation count
        #[arg(short, long, default_value = "brute force")]
        method: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            ranges,
            method,
            cycles,
            seed,
            timeframes,
            best_file,
            output,
            ticker,
            time_scale,
            top_n,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(method) = method {
                config.optimization.method = method.parse::<OptimizationMethod>()?;
            }
            if let Some(cycles) = cycles {
                config.optimization.cycles = cycles;
            }
            if seed.is_some() {
                config.optimization.seed = seed;
            }
            if let Some(timeframes) = timeframes {
                config.optimization.test_timeframes = true;
                config.optimization.timeframes = timeframes;
            }
            config.synchronizer = config.synchronizer.scaled(time_scale);

            let ranges = match ranges {
                Some(path) => load_ranges(&path)?,
                None => {
                    info!("Using default demo ranges");
                    demo_ranges()
                }
            };
            let space = ranges.into_space()?;
            let reporter = OptimizeReporter::new(top_n);

            println!("{}", "=".repeat(80));
            println!("🚀 Optimizing \"{}\" on {}", DEMO_STRATEGY, ticker);
            println!(
                "   Method: {}  Cycles: {}  Target: \"{}\" ({})",
                config.optimization.method,
                config.optimization.cycles,
                config.optimization.target_metric,
                if config.optimization.is_maximizing { "max" } else { "min" }
            );
            reporter.print_space_info(&space, config.optimization.method, &ranges.priority);
            println!("{}\n", "=".repeat(80));

            let definition = demo_definition(&space);
            let compute_time = Duration::from_millis((300.0 * time_scale.max(0.0)).round() as u64);
            let host = initialize_session(
                || {
                    let definition = definition.clone();
                    let space = space.clone();
                    async move {
                        Ok(MockHost::new(definition, synthetic_objective(space)).with_behavior(MockBehavior {
                            compute_time,
                            ..MockBehavior::default()
                        }))
                    }
                },
                CONNECT_TIMEOUT,
            )
            .await?;

            let mut request = OptimizationRequest::new(space).with_priority(ranges.priority.clone());
            if let Some(best) = best_file.as_deref().map(load_best).transpose()?.flatten() {
                request = request.with_best(best);
            }

            let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
            let progress = tokio::spawn(async move {
                let mut last: Option<ProgressUpdate> = None;
                while let Some(update) = rx.recv().await {
                    last = Some(update);
                }
                last
            });
            let optimizer = Optimizer::new(&config).with_progress(tx);

            let runs: Vec<TestRun> = if config.optimization.test_timeframes {
                let timeframes = parse_timeframes(&config.optimization.timeframes)?;
                let result = sweep(&optimizer, &host, &request, &timeframes).await?;
                if result.cancelled {
                    warn!("Timeframe sweep was cancelled");
                }
                if let Some(best) = result.best() {
                    println!(
                        "\n🏆 Best timeframe: {} ({})",
                        best.timeframe.as_deref().unwrap_or("?"),
                        format_value(best.best_value)
                    );
                }
                result.runs
            } else {
                vec![optimizer.run(&host, &request).await?]
            };

            for run in &runs {
                reporter.print_results_table(run);
                reporter.print_best(run);

                let csv_path = export_csv(run, &output, &ticker)?;
                let json_path = csv_path.with_extension("json");
                export_json(run, &json_path)?;
                println!("📁 Results saved to {:?} and {:?}", csv_path, json_path);
            }

            let last_run = runs.last();
            if let Some(run) = last_run {
                if optimizer.apply_best_and_verify(&host, run).await? {
                    println!("✅ Best parameters applied and verified");
                } else {
                    warn!("Best parameters could not be verified on the host");
                }
                if let Some(path) = best_file.as_deref() {
                    save_best(path, &run.best_assignment)?;
                }
            }

            drop(optimizer);
            if let Ok(Some(update)) = progress.await {
                info!("Last progress: {}", update.message);
            }
        }
        Commands::Space { ranges, method } => {
            let method = method.parse::<OptimizationMethod>()?;
            let ranges = load_ranges(&ranges)?;
            let space = ranges.into_space()?;
            OptimizeReporter::default().print_space_info(&space, method, &ranges.priority);
        }
    }

    Ok(())
}

fn load_ranges(path: &Path) -> Result<ParameterRanges> {
    info!("Loading parameter ranges from: {:?}", path);
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read ranges file {:?}", path))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse ranges file {:?}", path))
}

fn load_best(path: &Path) -> Result<Option<ParameterAssignment>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let best = serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))?;
    info!("Loaded best parameters from {:?}", path);
    Ok(Some(best))
}

fn save_best(path: &Path, best: &ParameterAssignment) -> Result<()> {
    let json = serde_json::to_string_pretty(best).context("Failed to serialize best parameters")?;
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, json).with_context(|| format!("Failed to write {:?}", temp_path))?;
    std::fs::rename(&temp_path, path).with_context(|| format!("Failed to rename {:?}", temp_path))?;
    info!("Saved best parameters to {:?}", path);
    Ok(())
}

fn demo_ranges() -> ParameterRanges {
    let mut ranges = ParameterRanges {
        priority: vec!["Fast Length".to_string(), "Slow Length".to_string()],
        ..ParameterRanges::default()
    };
    ranges.params.insert(
        "Fast Length".to_string(),
        ParameterRange::Numeric {
            from: 5.0,
            to: 25.0,
            step: 5.0,
        },
    );
    ranges.params.insert(
        "Slow Length".to_string(),
        ParameterRange::Options(vec![ParamValue::Int(30), ParamValue::Int(50), ParamValue::Int(100)]),
    );
    ranges.params.insert(
        "Stop Loss %".to_string(),
        ParameterRange::Numeric {
            from: 0.5,
            to: 3.0,
            step: 0.5,
        },
    );
    ranges
        .params
        .insert("Source".to_string(), ParameterRange::Choices("close;hl2;ohlc4".to_string()));
    ranges.params.insert("Use Trend Filter".to_string(), ParameterRange::Flag(false));
    ranges
}

/// Chart starts on the first value of every range, defaults are the last.
fn demo_definition(space: &ParameterSpace) -> StrategyDefinition {
    let pick = |last: bool| -> ParameterAssignment {
        space
            .iter()
            .filter_map(|(name, values)| {
                let value = if last { values.last() } else { values.first() };
                value.map(|v| (name.to_string(), v.clone()))
            })
            .collect()
    };
    StrategyDefinition {
        name: DEMO_STRATEGY.to_string(),
        current: pick(false),
        default: Some(pick(true)),
    }
}

/// Net profit peaks when every parameter sits in the middle of its range.
/// Trade count grows with the value indices so the filter has something to cut.
fn synthetic_objective(space: ParameterSpace) -> Objective {
    Arc::new(move |assignment: &ParameterAssignment| {
        let mut profit = 1000.0;
        let mut index_sum = 0usize;
        for (name, values) in space.iter() {
            let Some(index) = assignment.get(name).and_then(|v| space.index_of(name, v)) else {
                continue;
            };
            let span = values.len().max(1) as f64;
            let distance = (index as f64 - (values.len() - 1) as f64 / 2.0) / span;
            profit -= 800.0 * distance * distance;
            index_sum += index;
        }
        vec![
            ("Net profit".to_string(), profit),
            ("Total trades".to_string(), 40.0 + 10.0 * index_sum as f64),
            ("Percent profitable".to_string(), 35.0 + profit / 50.0),
        ]
    })
}
