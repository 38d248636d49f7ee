//! Simulated annealing over parameter indices.
//!
//! The working state drifts away from the best assignment while the
//! temperature is high; worse results are accepted with the Metropolis
//! probability `exp(-delta / T)` and otherwise the walk returns to the best.

use super::{Candidate, Observation, Proposal, covers_space, random_assignment, random_value};
use crate::domain::optimization::parameter::{ParamValue, ParameterAssignment, ParameterSpace};
use crate::domain::optimization::state::{AnnealingState, INITIAL_TEMPERATURE, MIN_TEMPERATURE};
use crate::domain::optimization::test_run::TestRun;
use rand::Rng;
use statrs::function::erf::erf_inv;
use std::f64::consts::SQRT_2;
use tracing::debug;

/// Geometric cooling, bounded away from zero.
pub fn cool(temperature: f64, cycles: usize) -> f64 {
    let cycles = cycles.max(1) as f64;
    (temperature * (1.0 - 1.0 / cycles)).max(MIN_TEMPERATURE)
}

/// Standard normal draw by inverse transform of a uniform one.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u: f64 = rng.random();
    SQRT_2 * erf_inv(2.0 * u - 1.0)
}

/// Normal draw squeezed into `[0, 1]` around 0.5, then stretched to `[min, max]`.
fn truncated_normal<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> f64 {
    loop {
        let z = standard_normal(rng);
        let unit = z / 10.0 + 0.5;
        if (0.0..=1.0).contains(&unit) {
            return min + unit * (max - min);
        }
    }
}

/// Moves `current` by a signed offset proportional to the temperature, wrapping around.
fn shifted_index<R: Rng + ?Sized>(current: usize, len: usize, temperature: f64, rng: &mut R) -> usize {
    if len <= 1 {
        return 0;
    }
    let offset = (temperature * truncated_normal(0.0, (len - 1) as f64, rng)).floor() as i64;
    let signed = if rng.random_bool(0.5) { offset } else { -offset };
    (current as i64 + signed).rem_euclid(len as i64) as usize
}

fn neighbour<R: Rng + ?Sized>(
    space: &ParameterSpace,
    last: &ParameterAssignment,
    temperature: f64,
    rng: &mut R,
) -> (ParameterAssignment, String) {
    let change_all = rng.random_range(0..=10) as f64 * temperature >= 5.0;
    let mut next = last.clone();

    if change_all {
        for (name, values) in space.iter() {
            let current = last.get(name).and_then(|v| space.index_of(name, v)).unwrap_or(0);
            let idx = shifted_index(current, values.len(), temperature, rng);
            next.set(name, values[idx].clone());
        }
        return (next, "Changed all parameters randomly.".to_string());
    }

    let names: Vec<&str> = space.names().collect();
    let Some(&name) = names.get(rng.random_range(0..names.len().max(1))) else {
        return (next, "No parameters to change.".to_string());
    };
    let values = space.values(name).unwrap_or_default();
    let old = last.get(name).cloned();
    let current_idx = old.as_ref().and_then(|v| space.index_of(name, v));

    let value = match current_idx {
        Some(current) if values.len() > 1 => {
            let idx = shifted_index(current, values.len(), temperature, rng);
            if idx == current {
                let others: Vec<ParamValue> = values.iter().filter(|v| Some(*v) != old.as_ref()).cloned().collect();
                random_value(&others, rng).cloned().unwrap_or_else(|| values[current].clone())
            } else {
                values[idx].clone()
            }
        }
        _ => random_value(values, rng).cloned().unwrap_or_else(|| values[0].clone()),
    };

    let message = match old {
        Some(old) => format!("Changed \"{}\": {} => {}.", name, old, value),
        None => format!("\"{}\" set to {}.", name, value),
    };
    next.set(name, value);
    (next, message)
}

pub fn next<R: Rng + ?Sized>(
    state: &mut AnnealingState,
    space: &ParameterSpace,
    run: &TestRun,
    rng: &mut R,
) -> Proposal {
    if !state.initialized {
        state.temperature = INITIAL_TEMPERATURE;
        if run.best_value.is_some() && covers_space(&run.best_assignment, space) {
            state.last_assignment = Some(run.best_assignment.clone());
            state.last_energy = run.best_value;
            state.best_assignment = Some(run.best_assignment.clone());
            state.best_energy = run.best_value;
        }
        state.initialized = true;
    }

    let (assignment, message) = match state.last_assignment.as_ref() {
        Some(last) => neighbour(space, last, state.temperature, rng),
        None => (
            random_assignment(space, rng),
            "Changed all parameters randomly without temperature.".to_string(),
        ),
    };

    Proposal::Evaluate(Candidate {
        assignment: assignment.expand(&run.best_assignment),
        message,
    })
}

/// Acceptance step and cooling after an evaluated candidate.
pub fn observe<R: Rng + ?Sized>(
    state: &mut AnnealingState,
    run: &TestRun,
    observation: Observation<'_>,
    rng: &mut R,
) {
    match observation.value {
        Some(energy) if observation.improved_best => {
            state.last_assignment = Some(observation.assignment.clone());
            state.last_energy = Some(energy);
            state.best_assignment = Some(observation.assignment.clone());
            state.best_energy = Some(energy);
        }
        Some(energy) => {
            let accepted = match state.last_energy {
                None => true,
                Some(last) => {
                    let worsening = if run.is_maximizing { last - energy } else { energy - last };
                    worsening <= 0.0 || rng.random::<f64>() <= (-worsening / state.temperature).exp()
                }
            };
            if accepted {
                state.last_assignment = Some(observation.assignment.clone());
                state.last_energy = Some(energy);
            } else {
                revert_to_best(state, run);
            }
        }
        None => revert_to_best(state, run),
    }

    state.temperature = cool(state.temperature, run.cycles);
    debug!("Annealing: temperature {:.6}", state.temperature);
}

fn revert_to_best(state: &mut AnnealingState, run: &TestRun) {
    if run.best_value.is_some() {
        state.last_assignment = Some(run.best_assignment.clone());
        state.last_energy = run.best_value;
    }
}
