use super::{Candidate, Proposal};
use crate::domain::optimization::parameter::ParameterSpace;
use crate::domain::optimization::state::SequentialState;
use crate::domain::optimization::test_run::TestRun;

/// Walks every value of one parameter at a time, in priority order, on top
/// of the best assignment found so far.
pub fn next(state: &mut SequentialState, space: &ParameterSpace, run: &TestRun) -> Proposal {
    let order = space.priority(&run.priority);

    match state.val_idx {
        None => state.val_idx = Some(0),
        Some(idx) => {
            let current_len = order
                .get(state.param_idx)
                .and_then(|name| space.values(name))
                .map_or(0, <[_]>::len);
            if idx + 1 < current_len {
                state.val_idx = Some(idx + 1);
            } else {
                state.param_idx += 1;
                state.val_idx = Some(0);
            }
        }
    }

    let Some(name) = order.get(state.param_idx) else {
        return Proposal::Exhausted;
    };
    let Some(value) = space
        .values(name)
        .and_then(|values| values.get(state.val_idx.unwrap_or(0)))
    else {
        return Proposal::Exhausted;
    };

    let message = match run.best_assignment.get(name) {
        Some(old) if old == value => {
            return Proposal::Skip {
                message: format!(
                    "The same value of the \"{}\" parameter equal to {} is skipped",
                    name, value
                ),
            };
        }
        Some(old) => format!("Changed \"{}\": {} => {}.", name, old, value),
        None => format!("\"{}\" set to {}.", name, value),
    };

    let mut assignment = run.best_assignment.clone();
    assignment.set(name.clone(), value.clone());
    Proposal::Evaluate(Candidate { assignment, message })
}
