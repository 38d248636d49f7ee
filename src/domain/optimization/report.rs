//! Parsed performance reports.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Marker written for a cell that could not be parsed.
pub const ERROR_SENTINEL: &str = "error";

/// Value of one report metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Error,
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MetricValue::Error)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{}", v),
            MetricValue::Text(v) => write!(f, "{}", v),
            MetricValue::Error => write!(f, "{}", ERROR_SENTINEL),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Number(v) => serializer.serialize_f64(*v),
            MetricValue::Text(v) => serializer.serialize_str(v),
            MetricValue::Error => serializer.serialize_str(ERROR_SENTINEL),
        }
    }
}

struct MetricValueVisitor;

impl<'de> Visitor<'de> for MetricValueVisitor {
    type Value = MetricValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or a string")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<MetricValue, E> {
        Ok(MetricValue::Number(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MetricValue, E> {
        Ok(MetricValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MetricValue, E> {
        Ok(MetricValue::Number(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MetricValue, E> {
        if v == ERROR_SENTINEL {
            Ok(MetricValue::Error)
        } else {
            Ok(MetricValue::Text(v.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MetricValueVisitor)
    }
}

/// Time spent on one evaluation, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationTiming {
    pub set_secs: f64,
    pub parse_secs: f64,
}

/// Metric name to value map produced for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub timing: IterationTiming,
}

impl PerformanceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricValue::as_f64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: MetricValue) {
        self.metrics.insert(name.into(), value);
    }

    /// Stores a value unless the name already holds a successfully parsed one.
    pub fn assign(&mut self, name: &str, value: MetricValue) {
        match self.metrics.get(name) {
            Some(existing) if !existing.is_error() => {}
            Some(_) if value.is_error() => {}
            _ => {
                self.metrics.insert(name.to_string(), value);
            }
        }
    }

    /// Copies recovered values for names that are missing or failed here.
    pub fn merge_recovered(&mut self, recovered: PerformanceReport) {
        for (name, value) in recovered.metrics {
            self.assign(&name, value);
        }
    }

    pub fn error_count(&self) -> usize {
        self.metrics.values().filter(|v| v.is_error()).count()
    }

    /// Share of fields that parsed to a number.
    pub fn numeric_ratio(&self) -> f64 {
        if self.metrics.is_empty() {
            return 0.0;
        }
        let numeric = self
            .metrics
            .values()
            .filter(|v| matches!(v, MetricValue::Number(_)))
            .count();
        numeric as f64 / self.metrics.len() as f64
    }

    /// Value of the target metric.
    ///
    /// Falls back to a field named `<target>: <value>` when the report carries
    /// the target only as a label.
    pub fn target_value(&self, target: &str) -> Option<f64> {
        if let Some(value) = self.number(target) {
            return Some(value);
        }
        let prefix = format!("{}: ", target);
        self.metrics
            .keys()
            .find_map(|key| key.strip_prefix(prefix.as_str()))
            .and_then(|suffix| suffix.trim().parse::<f64>().ok())
    }

    pub fn append_comment(&mut self, text: &str) {
        self.comment = Some(match self.comment.take() {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, text),
            _ => text.to_string(),
        });
    }

    pub fn prepend_comment(&mut self, text: &str) {
        self.comment = Some(match self.comment.take() {
            Some(existing) if !existing.is_empty() => format!("{} {}", text, existing),
            _ => text.to_string(),
        });
    }
}

/// Rounds a metric for display, showing zero when there is nothing to show.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => "0.00".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_only_replaces_errors() {
        let mut report = PerformanceReport::new();
        report.assign("Net profit: All", MetricValue::Error);
        report.assign("Net profit: All", MetricValue::Number(10.0));
        assert_eq!(report.number("Net profit: All"), Some(10.0));

        report.assign("Net profit: All", MetricValue::Number(99.0));
        assert_eq!(report.number("Net profit: All"), Some(10.0));

        report.assign("Net profit: All", MetricValue::Error);
        assert_eq!(report.number("Net profit: All"), Some(10.0));
    }

    #[test]
    fn test_target_value_falls_back_to_label() {
        let mut report = PerformanceReport::new();
        report.insert("Net profit: All: 42.5", MetricValue::Text(String::new()));
        assert_eq!(report.target_value("Net profit: All"), Some(42.5));
        assert_eq!(PerformanceReport::new().target_value("Net profit: All"), None);
    }

    #[test]
    fn test_error_sentinel_serialization() {
        let mut report = PerformanceReport::new();
        report.insert("A", MetricValue::Error);
        report.insert("B", MetricValue::Number(1.5));
        let json = serde_json::to_string(&report.metrics).unwrap();
        assert_eq!(json, r#"{"A":"error","B":1.5}"#);

        let back: BTreeMap<String, MetricValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report.metrics);
    }

    #[test]
    fn test_comments_accumulate() {
        let mut report = PerformanceReport::new();
        report.append_comment("Calculation failed.");
        report.prepend_comment("Current parameters.");
        assert_eq!(
            report.comment.as_deref(),
            Some("Current parameters. Calculation failed.")
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(12.346)), "12.35");
        assert_eq!(format_value(None), "0.00");
        assert_eq!(format_value(Some(f64::NAN)), "0.00");
    }
}
