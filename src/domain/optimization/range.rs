//! User supplied ranges and their expansion into a [`ParameterSpace`].

use crate::domain::errors::SetupError;
use crate::domain::optimization::parameter::{ParamValue, ParameterSpace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Guards against runaway expansion of a mistyped step.
const MAX_VALUES_PER_PARAMETER: usize = 100_000;

/// How the candidate values of one parameter are described.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterRange {
    /// Explicit list of values. Tried first so a three element list is never
    /// read as a range.
    Options(Vec<ParamValue>),
    /// Inclusive numeric range.
    Numeric { from: f64, to: f64, step: f64 },
    /// Boolean input; both states are tried, the given one first.
    Flag(bool),
    /// `;` separated list of option labels.
    Choices(String),
}

impl ParameterRange {
    pub fn expand(&self, name: &str) -> Result<Vec<ParamValue>, SetupError> {
        let values = match self {
            ParameterRange::Numeric { from, to, step } => numeric_values(name, *from, *to, *step)?,
            ParameterRange::Options(options) => dedup(options.clone()),
            ParameterRange::Flag(first) => vec![ParamValue::Bool(*first), ParamValue::Bool(!*first)],
            ParameterRange::Choices(raw) => dedup(
                raw.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ParamValue::from)
                    .collect(),
            ),
        };
        if values.is_empty() {
            return Err(SetupError::EmptyParameterValues {
                name: name.to_string(),
            });
        }
        Ok(values)
    }
}

fn dedup(values: Vec<ParamValue>) -> Vec<ParamValue> {
    let mut unique: Vec<ParamValue> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

fn decimals(value: f64) -> i32 {
    let text = format!("{}", value);
    text.split_once('.')
        .map(|(_, frac)| frac.len().min(10) as i32)
        .unwrap_or(0)
}

fn numeric_values(name: &str, from: f64, to: f64, step: f64) -> Result<Vec<ParamValue>, SetupError> {
    let invalid = |reason: &str| SetupError::InvalidRange {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if !from.is_finite() || !to.is_finite() || !step.is_finite() {
        return Err(invalid("bounds and step must be finite numbers"));
    }
    if step <= 0.0 {
        return Err(invalid("step must be greater than zero"));
    }
    if from > to {
        return Err(invalid("\"from\" is greater than \"to\""));
    }
    let count = ((to - from) / step + 1e-9).floor() as usize + 1;
    if count > MAX_VALUES_PER_PARAMETER {
        return Err(invalid("too many values, increase the step"));
    }

    let integral = from.fract() == 0.0 && step.fract() == 0.0;
    let precision = decimals(step).max(decimals(from));
    let scale = 10f64.powi(precision);

    Ok((0..count)
        .map(|i| {
            let raw = from + step * i as f64;
            if integral {
                ParamValue::Int(raw.round() as i64)
            } else {
                ParamValue::Float((raw * scale).round() / scale)
            }
        })
        .collect())
}

/// Contents of a ranges file: per-parameter ranges and an optional priority.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterRanges {
    #[serde(default)]
    pub priority: Vec<String>,
    pub params: BTreeMap<String, ParameterRange>,
}

impl ParameterRanges {
    pub fn into_space(&self) -> Result<ParameterSpace, SetupError> {
        let mut params = BTreeMap::new();
        for (name, range) in &self.params {
            params.insert(name.clone(), range.expand(name)?);
        }
        ParameterSpace::new(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_range_expands_inclusively() {
        let range = ParameterRange::Numeric {
            from: 10.0,
            to: 30.0,
            step: 10.0,
        };
        assert_eq!(
            range.expand("Length").unwrap(),
            vec![ParamValue::Int(10), ParamValue::Int(20), ParamValue::Int(30)]
        );
    }

    #[test]
    fn test_float_range_is_rounded_to_step_precision() {
        let range = ParameterRange::Numeric {
            from: 0.1,
            to: 0.5,
            step: 0.2,
        };
        assert_eq!(
            range.expand("Factor").unwrap(),
            vec![
                ParamValue::Float(0.1),
                ParamValue::Float(0.3),
                ParamValue::Float(0.5)
            ]
        );
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let zero_step = ParameterRange::Numeric {
            from: 1.0,
            to: 2.0,
            step: 0.0,
        };
        assert!(matches!(zero_step.expand("X"), Err(SetupError::InvalidRange { .. })));

        let inverted = ParameterRange::Numeric {
            from: 5.0,
            to: 1.0,
            step: 1.0,
        };
        assert!(inverted.expand("X").is_err());
    }

    #[test]
    fn test_choices_and_flags() {
        let choices = ParameterRange::Choices("EMA; SMA;;EMA".to_string());
        assert_eq!(
            choices.expand("Type").unwrap(),
            vec![ParamValue::from("EMA"), ParamValue::from("SMA")]
        );
        assert_eq!(
            ParameterRange::Flag(false).expand("Use").unwrap(),
            vec![ParamValue::Bool(false), ParamValue::Bool(true)]
        );
    }

    #[test]
    fn test_ranges_file_from_toml() {
        let text = r#"
            priority = ["Slow", "Fast"]

            [params]
            Fast = { from = 5, to = 15, step = 5 }
            Slow = [50, 100]
            Mode = "Long;Short"
        "#;
        let ranges: ParameterRanges = toml::from_str(text).unwrap();
        assert_eq!(
            ranges.params["Slow"],
            ParameterRange::Options(vec![ParamValue::Int(50), ParamValue::Int(100)])
        );
        let space = ranges.into_space().unwrap();
        assert_eq!(space.len(), 3);
        assert_eq!(space.values("Fast").unwrap().len(), 3);
        assert_eq!(space.values("Slow").unwrap(), &[ParamValue::Int(50), ParamValue::Int(100)]);
        assert_eq!(space.priority(&ranges.priority)[0], "Slow");
    }
}
