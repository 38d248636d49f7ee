//! Repeats an optimization on several chart timeframes.

use crate::application::optimization::optimizer::{OptimizationRequest, Optimizer};
use crate::domain::errors::{OptimizerError, SetupError};
use crate::domain::optimization::report::format_value;
use crate::domain::optimization::test_run::TestRun;
use crate::domain::ports::HostAdapter;
use tracing::{info, warn};

const TIMEFRAME_UNITS: [char; 5] = ['m', 'h', 'D', 'W', 'M'];

/// One or two digits followed by a unit: `5m`, `4h`, `1D`, `1W`, `12M`.
pub fn is_valid_timeframe(timeframe: &str) -> bool {
    let Some(unit) = timeframe.chars().last() else {
        return false;
    };
    let digits = &timeframe[..timeframe.len() - unit.len_utf8()];
    TIMEFRAME_UNITS.contains(&unit)
        && (1..=2).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parses a comma-separated timeframe list, dropping invalid entries.
pub fn parse_timeframes(list: &str) -> Result<Vec<String>, SetupError> {
    let mut timeframes = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if is_valid_timeframe(entry) {
            timeframes.push(entry.to_string());
        } else {
            warn!("TimeframeSweep: ignoring invalid timeframe \"{}\"", entry);
        }
    }
    if timeframes.is_empty() {
        return Err(SetupError::InvalidConfig {
            reason: format!("no valid timeframe in \"{}\"", list),
        });
    }
    Ok(timeframes)
}

#[derive(Debug, Clone)]
pub struct TimeframeSweep {
    pub runs: Vec<TestRun>,
    pub cancelled: bool,
}

impl TimeframeSweep {
    /// Run with the best final value across timeframes.
    pub fn best(&self) -> Option<&TestRun> {
        let mut best: Option<&TestRun> = None;
        for run in &self.runs {
            let Some(value) = run.best_value else {
                continue;
            };
            if best.is_none_or(|b| run.is_better(value, b.best_value)) {
                best = Some(run);
            }
        }
        best
    }
}

/// Optimizes on every timeframe in turn.
///
/// Previously saved best parameters are never part of the baseline here, each
/// timeframe starts from the values on the chart. Cancellation is checked
/// between timeframes.
pub async fn sweep<H>(
    optimizer: &Optimizer,
    host: &H,
    request: &OptimizationRequest,
    timeframes: &[String],
) -> Result<TimeframeSweep, OptimizerError>
where
    H: HostAdapter + ?Sized,
{
    let mut result = TimeframeSweep {
        runs: Vec::with_capacity(timeframes.len()),
        cancelled: false,
    };

    for timeframe in timeframes {
        if host.is_cancelled() {
            info!("TimeframeSweep: cancelled before {}", timeframe);
            result.cancelled = true;
            break;
        }
        info!("TimeframeSweep: testing timeframe {}", timeframe);
        host.change_timeframe(timeframe).await?;

        let mut per_timeframe = request.clone();
        per_timeframe.best = None;
        per_timeframe.timeframe = Some(timeframe.clone());
        let run = optimizer.run(host, &per_timeframe).await?;
        info!(
            "TimeframeSweep: {} best \"{}\" {}",
            timeframe,
            run.target_metric,
            format_value(run.best_value)
        );
        result.runs.push(run);
    }

    match result.best() {
        Some(best) => info!(
            "TimeframeSweep: the best value {} for timeframe {}",
            format_value(best.best_value),
            best.timeframe.as_deref().unwrap_or("?")
        ),
        None => warn!("TimeframeSweep: no result value found"),
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_validation() {
        for tf in ["1m", "15m", "4h", "1D", "1W", "12M"] {
            assert!(is_valid_timeframe(tf), "{}", tf);
        }
        for tf in ["", "m", "100m", "1d", "1Y", "h1", "1.5h"] {
            assert!(!is_valid_timeframe(tf), "{}", tf);
        }
    }

    #[test]
    fn test_parse_list_drops_invalid_entries() {
        assert_eq!(
            parse_timeframes(" 1h, 4h ,bad, 1D,").unwrap(),
            vec!["1h".to_string(), "4h".to_string(), "1D".to_string()]
        );
        assert!(matches!(
            parse_timeframes("x, y"),
            Err(SetupError::InvalidConfig { .. })
        ));
    }
}
