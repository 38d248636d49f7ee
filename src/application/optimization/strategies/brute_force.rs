use super::{Candidate, Proposal};
use crate::domain::optimization::parameter::{ParameterAssignment, ParameterSpace};
use crate::domain::optimization::state::BruteForceState;
use crate::domain::optimization::test_run::TestRun;

/// Enumerates the full cartesian product like an odometer. The first
/// priority parameter changes fastest.
pub fn next(state: &mut BruteForceState, space: &ParameterSpace, run: &TestRun) -> Proposal {
    let order = space.priority(&run.priority);
    let lengths: Vec<usize> = order
        .iter()
        .map(|name| space.values(name).map_or(0, <[_]>::len))
        .collect();

    let message = match state.indices.as_mut() {
        None => {
            state.indices = Some(vec![0; order.len()]);
            "All parameters set to init values".to_string()
        }
        Some(indices) => {
            let mut position = 0;
            loop {
                if position >= indices.len() {
                    return Proposal::Exhausted;
                }
                indices[position] += 1;
                if indices[position] < lengths[position] {
                    break;
                }
                indices[position] = 0;
                position += 1;
            }
            let name = &order[position];
            let value = &space.values(name).unwrap_or_default()[indices[position]];
            format!("\"{}\" set to {}.", name, value)
        }
    };

    let Some(indices) = state.indices.as_ref() else {
        return Proposal::Exhausted;
    };
    let picked: ParameterAssignment = order
        .iter()
        .zip(indices)
        .filter_map(|(name, idx)| {
            space
                .values(name)
                .and_then(|values| values.get(*idx))
                .map(|value| (name.clone(), value.clone()))
        })
        .collect();

    Proposal::Evaluate(Candidate {
        assignment: picked.expand(&run.best_assignment),
        message,
    })
}
