//! Optimization settings loaded from TOML with environment overrides.

use crate::domain::errors::SetupError;
use crate::domain::optimization::test_run::{MetricFilter, OptimizationMethod};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_TARGET_METRIC: &str = "Net profit: All";
pub const DEFAULT_FILTER_METRIC: &str = "Total trades: All";
/// Longest accepted delay or loading wait, one day.
pub const MAX_WAIT_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    #[serde(alias = "optMethod")]
    pub method: OptimizationMethod,
    #[serde(alias = "isMaximizing")]
    pub is_maximizing: bool,
    /// Metric whose value is optimized.
    #[serde(alias = "optParamName")]
    pub target_metric: String,
    /// `None` disables filtering; `Some(true)` drops results below the threshold.
    #[serde(alias = "optFilterAscending")]
    pub filter_ascending: Option<bool>,
    #[serde(alias = "optFilterValue")]
    pub filter_value: f64,
    #[serde(alias = "optFilterParamName")]
    pub filter_metric: String,
    pub cycles: usize,
    /// Seconds between iterations.
    #[serde(alias = "backtestDelay")]
    pub backtest_delay: f64,
    #[serde(alias = "randomDelay")]
    pub random_delay: bool,
    #[serde(alias = "shouldSkipInitBestResult")]
    pub skip_init_best_result: bool,
    /// Seconds to wait for one recomputation.
    #[serde(alias = "dataLoadingTime")]
    pub data_loading_time: f64,
    /// Random sampling stops once every combination has been proposed.
    pub random_without_replacement: bool,
    /// Repeat the run for every timeframe of `timeframes`.
    #[serde(alias = "shouldTestTF")]
    pub test_timeframes: bool,
    /// Comma separated timeframe list such as `"15m,1h,4h,1D"`.
    #[serde(alias = "listOfTF")]
    pub timeframes: String,
    /// Seed for the strategy random source. Unset draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            method: OptimizationMethod::Random,
            is_maximizing: true,
            target_metric: DEFAULT_TARGET_METRIC.to_string(),
            filter_ascending: None,
            filter_value: 50.0,
            filter_metric: DEFAULT_FILTER_METRIC.to_string(),
            cycles: 100,
            backtest_delay: 0.0,
            random_delay: true,
            skip_init_best_result: false,
            data_loading_time: 30.0,
            random_without_replacement: false,
            test_timeframes: false,
            timeframes: String::new(),
            seed: None,
        }
    }
}

impl OptimizationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: OptimizationConfig =
            toml::from_str(text).context("Failed to parse optimization config")?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read optimization config {:?}", path))?;
        Self::from_toml_str(&text)
    }

    /// Applies `OPTIMIZER_*` environment variables on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(method) = env_parse::<String>("OPTIMIZER_METHOD") {
            match OptimizationMethod::from_str(&method) {
                Ok(method) => self.method = method,
                Err(e) => warn!("OptimizationConfig: ignoring OPTIMIZER_METHOD: {}", e),
            }
        }
        if let Some(v) = env_parse("OPTIMIZER_IS_MAXIMIZING") {
            self.is_maximizing = v;
        }
        if let Some(v) = env_parse("OPTIMIZER_TARGET_METRIC") {
            self.target_metric = v;
        }
        if let Some(v) = env_parse("OPTIMIZER_CYCLES") {
            self.cycles = v;
        }
        if let Some(v) = env_parse("OPTIMIZER_BACKTEST_DELAY") {
            self.backtest_delay = v;
        }
        if let Some(v) = env_parse("OPTIMIZER_RANDOM_DELAY") {
            self.random_delay = v;
        }
        if let Some(v) = env_parse("OPTIMIZER_DATA_LOADING_TIME") {
            self.data_loading_time = v;
        }
        if let Some(v) = env_parse("OPTIMIZER_SEED") {
            self.seed = Some(v);
        }
        self
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        let invalid = |reason: String| Err(SetupError::InvalidConfig { reason });
        if self.cycles == 0 {
            return invalid("cycles must be at least 1".to_string());
        }
        if seconds(self.backtest_delay).is_err() {
            return invalid(format!("backtest delay {} is not a valid number of seconds", self.backtest_delay));
        }
        if self.data_loading_time <= 0.0 || seconds(self.data_loading_time).is_err() {
            return invalid(format!(
                "data loading time {} is not a valid number of seconds",
                self.data_loading_time
            ));
        }
        if self.target_metric.trim().is_empty() {
            return invalid("the target metric name is empty".to_string());
        }
        if self.filter_ascending.is_some() && !self.filter_value.is_finite() {
            return invalid("the filter threshold is not a number".to_string());
        }
        Ok(())
    }

    pub fn filter(&self) -> Option<MetricFilter> {
        self.filter_ascending.map(|ascending| MetricFilter {
            metric: self.filter_metric.clone(),
            ascending,
            value: self.filter_value,
        })
    }

    /// Invalid or out-of-range values fall back to zero or the longest wait.
    pub fn delay(&self) -> Duration {
        clamped(self.backtest_delay)
    }

    pub fn data_loading_timeout(&self) -> Duration {
        clamped(self.data_loading_time)
    }
}

fn seconds(value: f64) -> Result<Duration, String> {
    if value > MAX_WAIT_SECS {
        return Err(format!("longer than {} seconds", MAX_WAIT_SECS));
    }
    Duration::try_from_secs_f64(value).map_err(|e| e.to_string())
}

fn clamped(value: f64) -> Duration {
    seconds(value).unwrap_or_else(|_| {
        if value > MAX_WAIT_SECS {
            Duration::from_secs_f64(MAX_WAIT_SECS)
        } else {
            Duration::ZERO
        }
    })
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("OptimizationConfig: ignoring unparsable {}={}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizationConfig::default();
        assert_eq!(config.method, OptimizationMethod::Random);
        assert!(config.is_maximizing);
        assert_eq!(config.target_metric, "Net profit: All");
        assert_eq!(config.cycles, 100);
        assert!(config.random_delay);
        assert!(config.filter().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_with_original_names() {
        let config = OptimizationConfig::from_toml_str(
            r#"
            optMethod = "brute force"
            isMaximizing = false
            optParamName = "Max equity drawdown"
            optFilterAscending = true
            optFilterValue = 20
            cycles = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.method, OptimizationMethod::BruteForce);
        assert!(!config.is_maximizing);
        assert_eq!(config.target_metric, "Max equity drawdown");
        let filter = config.filter().unwrap();
        assert!(filter.ascending);
        assert_eq!(filter.value, 20.0);
        assert_eq!(filter.metric, "Total trades: All");
        assert_eq!(config.cycles, 25);
    }

    #[test]
    fn test_validation() {
        let config = OptimizationConfig {
            cycles: 0,
            ..OptimizationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SetupError::InvalidConfig { .. })));

        let config = OptimizationConfig {
            data_loading_time: 0.0,
            ..OptimizationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_waits_are_rejected_and_clamped() {
        let config = OptimizationConfig::from_toml_str("backtestDelay = 1e20\ndataLoadingTime = 1e300").unwrap();
        assert!(matches!(config.validate(), Err(SetupError::InvalidConfig { .. })));
        assert_eq!(config.delay(), Duration::from_secs_f64(MAX_WAIT_SECS));
        assert_eq!(config.data_loading_timeout(), Duration::from_secs_f64(MAX_WAIT_SECS));

        let config = OptimizationConfig {
            backtest_delay: -1.0,
            data_loading_time: f64::NAN,
            ..OptimizationConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.delay(), Duration::ZERO);
        assert_eq!(config.data_loading_timeout(), Duration::ZERO);
    }
}
