//! Candidate generation for the optimization loop.
//!
//! Each method keeps its own [`OptimizationState`] variant. The loop asks for
//! a [`Proposal`], evaluates it, then reports back through [`observe`] so
//! stateful methods can react to the result.

pub mod annealing;
pub mod brute_force;
pub mod random;
pub mod random_improvement;
pub mod sequential;

use crate::domain::optimization::parameter::{ParamValue, ParameterAssignment, ParameterSpace};
use crate::domain::optimization::state::OptimizationState;
use crate::domain::optimization::test_run::TestRun;
use rand::Rng;

/// An assignment to evaluate and a note on how it was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub assignment: ParameterAssignment,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    Evaluate(Candidate),
    /// Nothing new to evaluate this cycle; the best value stands.
    Skip { message: String },
    /// The space has been fully explored.
    Exhausted,
}

/// Result of evaluating a proposed candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<'a> {
    pub assignment: &'a ParameterAssignment,
    /// `None` when the iteration failed or was filtered out.
    pub value: Option<f64>,
    pub improved_best: bool,
}

pub fn next_candidate<R: Rng + ?Sized>(
    state: &mut OptimizationState,
    space: &ParameterSpace,
    run: &TestRun,
    rng: &mut R,
) -> Proposal {
    match state {
        OptimizationState::Random(state) => random::next(state, space, run, rng),
        OptimizationState::RandomImprovement => random_improvement::next(space, run, rng),
        OptimizationState::Annealing(state) => annealing::next(state, space, run, rng),
        OptimizationState::Sequential(state) => sequential::next(state, space, run),
        OptimizationState::BruteForce(state) => brute_force::next(state, space, run),
    }
}

pub fn observe<R: Rng + ?Sized>(
    state: &mut OptimizationState,
    run: &TestRun,
    observation: Observation<'_>,
    rng: &mut R,
) {
    if let OptimizationState::Annealing(state) = state {
        annealing::observe(state, run, observation, rng);
    }
}

pub(crate) fn random_value<'a, R: Rng + ?Sized>(values: &'a [ParamValue], rng: &mut R) -> Option<&'a ParamValue> {
    if values.is_empty() {
        return None;
    }
    values.get(rng.random_range(0..values.len()))
}

/// Draws every space parameter uniformly.
pub(crate) fn random_assignment<R: Rng + ?Sized>(space: &ParameterSpace, rng: &mut R) -> ParameterAssignment {
    space
        .iter()
        .filter_map(|(name, values)| random_value(values, rng).map(|v| (name.to_string(), v.clone())))
        .collect()
}

/// True when the best assignment holds a value for every space parameter.
pub(crate) fn covers_space(assignment: &ParameterAssignment, space: &ParameterSpace) -> bool {
    space.names().all(|name| assignment.get(name).is_some())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::optimization::parameter::{ParamValue, ParameterAssignment, ParameterSpace};
    use crate::domain::optimization::test_run::{OptimizationMethod, StartParams, TestRun};
    use std::collections::BTreeMap;

    pub fn int_space(params: &[(&str, &[i64])]) -> ParameterSpace {
        let map: BTreeMap<String, Vec<ParamValue>> = params
            .iter()
            .map(|(name, values)| (name.to_string(), values.iter().map(|v| ParamValue::Int(*v)).collect()))
            .collect();
        ParameterSpace::new(map).unwrap()
    }

    pub fn run_with_best(
        method: OptimizationMethod,
        priority: &[&str],
        best: ParameterAssignment,
        best_value: Option<f64>,
        cycles: usize,
    ) -> TestRun {
        let mut run = TestRun::new(
            "Demo",
            method,
            true,
            "Net profit: All",
            cycles,
            None,
            priority.iter().map(|s| s.to_string()).collect(),
            StartParams {
                current: best.clone(),
                default: None,
                best: None,
            },
        );
        run.best_assignment = best;
        run.best_value = best_value;
        run
    }
}
