//! Strategy parameter values, the search space and concrete assignments.

use crate::domain::errors::SetupError;
use crate::domain::optimization::test_run::OptimizationMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single value of a strategy input as the host accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// Ordered candidate values for every parameter under optimization.
///
/// Only built through [`ParameterSpace::new`], deserialization included, so
/// every instance has at least one parameter and every parameter a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<ParamValue>>",
    into = "BTreeMap<String, Vec<ParamValue>>"
)]
pub struct ParameterSpace {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParameterSpace {
    pub fn new(params: BTreeMap<String, Vec<ParamValue>>) -> Result<Self, SetupError> {
        let space = Self { params };
        space.validate()?;
        Ok(space)
    }

    /// Fails on an empty space or a parameter without values.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.params.is_empty() {
            return Err(SetupError::EmptyParameterSpace);
        }
        if let Some((name, _)) = self.params.iter().find(|(_, values)| values.is_empty()) {
            return Err(SetupError::EmptyParameterValues { name: name.clone() });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.params.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParamValue])> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn index_of(&self, name: &str, value: &ParamValue) -> Option<usize> {
        self.params.get(name)?.iter().position(|v| v == value)
    }

    /// Number of distinct assignments over the whole space, saturating.
    pub fn combinations(&self) -> u128 {
        self.params
            .values()
            .fold(1u128, |acc, v| acc.saturating_mul(v.len() as u128))
    }

    /// Number of evaluations a method needs to cover the space once.
    pub fn size_for(&self, method: OptimizationMethod) -> u128 {
        match method {
            OptimizationMethod::Sequential => {
                self.params.values().map(|v| v.len() as u128).sum()
            }
            _ => self.combinations(),
        }
    }

    /// Parameter order used by the deterministic strategies.
    ///
    /// Names from `ranking` that are part of the space come first, in ranking
    /// order; the remaining space parameters follow in name order.
    pub fn priority(&self, ranking: &[String]) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::with_capacity(self.params.len());
        for name in ranking {
            if self.params.contains_key(name) && !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }
        for name in self.params.keys() {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }
        ordered
    }
}

/// A concrete value for each strategy input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterAssignment(BTreeMap<String, ParamValue>);

impl ParameterAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fills every name `base` knows about that this assignment leaves out.
    ///
    /// Values set here always win. Applying the result again against the same
    /// base returns it unchanged.
    pub fn expand(&self, base: &ParameterAssignment) -> ParameterAssignment {
        let mut expanded = base.0.clone();
        for (name, value) in &self.0 {
            expanded.insert(name.clone(), value.clone());
        }
        ParameterAssignment(expanded)
    }

    /// True when some value of this assignment is absent or different in `other`.
    pub fn differs_from(&self, other: &ParameterAssignment) -> bool {
        self.0.iter().any(|(name, value)| other.get(name) != Some(value))
    }

    /// Restricts the assignment to the parameters under optimization.
    pub fn restricted_to(&self, space: &ParameterSpace) -> ParameterAssignment {
        ParameterAssignment(
            self.0
                .iter()
                .filter(|(name, _)| space.contains(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Stable textual key, used to recognise already tested combinations.
    pub fn fingerprint(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl TryFrom<BTreeMap<String, Vec<ParamValue>>> for ParameterSpace {
    type Error = SetupError;

    fn try_from(params: BTreeMap<String, Vec<ParamValue>>) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<ParameterSpace> for BTreeMap<String, Vec<ParamValue>> {
    fn from(space: ParameterSpace) -> Self {
        space.params
    }
}

impl FromIterator<(String, ParamValue)> for ParameterAssignment {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        ParameterAssignment(iter.into_iter().collect())
    }
}

impl fmt::Display for ParameterAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        write!(f, "{}", parts.join(", "))
    }
}
