//! Per-run state of the iteration strategies.

use crate::domain::optimization::parameter::ParameterAssignment;
use crate::domain::optimization::test_run::OptimizationMethod;
use std::collections::HashSet;

pub const INITIAL_TEMPERATURE: f64 = 1.0;
pub const MIN_TEMPERATURE: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RandomState {
    /// Fingerprints of assignments already proposed, when sampling without replacement.
    pub seen: HashSet<String>,
    pub without_replacement: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnealingState {
    pub temperature: f64,
    pub last_assignment: Option<ParameterAssignment>,
    pub last_energy: Option<f64>,
    pub best_assignment: Option<ParameterAssignment>,
    pub best_energy: Option<f64>,
    pub initialized: bool,
}

impl Default for AnnealingState {
    fn default() -> Self {
        Self {
            temperature: INITIAL_TEMPERATURE,
            last_assignment: None,
            last_energy: None,
            best_assignment: None,
            best_energy: None,
            initialized: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequentialState {
    pub param_idx: usize,
    /// `None` until the first proposal.
    pub val_idx: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BruteForceState {
    /// One index per priority parameter; `None` until the first proposal.
    pub indices: Option<Vec<usize>>,
}

/// Strategy state, one variant per method.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationState {
    Random(RandomState),
    RandomImprovement,
    Annealing(AnnealingState),
    Sequential(SequentialState),
    BruteForce(BruteForceState),
}

impl OptimizationState {
    pub fn for_method(method: OptimizationMethod, without_replacement: bool) -> Self {
        match method {
            OptimizationMethod::Random => OptimizationState::Random(RandomState {
                seen: HashSet::new(),
                without_replacement,
            }),
            OptimizationMethod::RandomImprovement => OptimizationState::RandomImprovement,
            OptimizationMethod::Annealing => OptimizationState::Annealing(AnnealingState::default()),
            OptimizationMethod::Sequential => OptimizationState::Sequential(SequentialState::default()),
            OptimizationMethod::BruteForce => OptimizationState::BruteForce(BruteForceState::default()),
        }
    }

    pub fn method(&self) -> OptimizationMethod {
        match self {
            OptimizationState::Random(_) => OptimizationMethod::Random,
            OptimizationState::RandomImprovement => OptimizationMethod::RandomImprovement,
            OptimizationState::Annealing(_) => OptimizationMethod::Annealing,
            OptimizationState::Sequential(_) => OptimizationMethod::Sequential,
            OptimizationState::BruteForce(_) => OptimizationMethod::BruteForce,
        }
    }
}
