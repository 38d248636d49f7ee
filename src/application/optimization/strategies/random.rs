use super::{Candidate, Proposal, random_assignment};
use crate::domain::optimization::parameter::{ParameterAssignment, ParameterSpace};
use crate::domain::optimization::state::RandomState;
use crate::domain::optimization::test_run::TestRun;
use rand::Rng;

/// Random draws tried before falling back to a scan for an unseen combination.
const MAX_DRAWS: usize = 64;
/// Draws tried on a space too large to scan before the cycle is skipped.
const MAX_FALLBACK_DRAWS: usize = 4096;
/// Largest space that is scanned exhaustively for an unseen combination.
const MAX_SCAN: u128 = 1_000_000;

const MESSAGE: &str = "All parameters are changed randomly";

pub fn next<R: Rng + ?Sized>(
    state: &mut RandomState,
    space: &ParameterSpace,
    run: &TestRun,
    rng: &mut R,
) -> Proposal {
    if !state.without_replacement {
        return evaluate(random_assignment(space, rng), run);
    }
    next_unseen(state, space, run, rng, MAX_SCAN)
}

fn next_unseen<R: Rng + ?Sized>(
    state: &mut RandomState,
    space: &ParameterSpace,
    run: &TestRun,
    rng: &mut R,
    max_scan: u128,
) -> Proposal {
    let total = space.combinations();
    if state.seen.len() as u128 >= total {
        return Proposal::Exhausted;
    }
    if let Some(candidate) = draw_unseen(state, space, rng, MAX_DRAWS) {
        return evaluate(candidate, run);
    }
    if total <= max_scan {
        if let Some(candidate) = first_unseen(space, state) {
            state.seen.insert(candidate.fingerprint());
            return evaluate(candidate, run);
        }
        return Proposal::Exhausted;
    }
    match draw_unseen(state, space, rng, MAX_FALLBACK_DRAWS) {
        Some(candidate) => evaluate(candidate, run),
        None => Proposal::Skip {
            message: "No unseen combination found".to_string(),
        },
    }
}

/// Draws until an unseen combination turns up and marks it as seen.
fn draw_unseen<R: Rng + ?Sized>(
    state: &mut RandomState,
    space: &ParameterSpace,
    rng: &mut R,
    attempts: usize,
) -> Option<ParameterAssignment> {
    (0..attempts).find_map(|_| {
        let candidate = random_assignment(space, rng);
        state.seen.insert(candidate.fingerprint()).then_some(candidate)
    })
}

fn evaluate(candidate: ParameterAssignment, run: &TestRun) -> Proposal {
    Proposal::Evaluate(Candidate {
        assignment: candidate.expand(&run.best_assignment),
        message: MESSAGE.to_string(),
    })
}

fn first_unseen(space: &ParameterSpace, state: &RandomState) -> Option<ParameterAssignment> {
    let params: Vec<(&str, &[_])> = space.iter().collect();
    let mut indices = vec![0usize; params.len()];
    loop {
        let candidate: ParameterAssignment = params
            .iter()
            .zip(&indices)
            .map(|((name, values), idx)| (name.to_string(), values[*idx].clone()))
            .collect();
        if !state.seen.contains(&candidate.fingerprint()) {
            return Some(candidate);
        }
        let mut position = 0;
        loop {
            if position == params.len() {
                return None;
            }
            indices[position] += 1;
            if indices[position] < params[position].1.len() {
                break;
            }
            indices[position] = 0;
            position += 1;
        }
    }
}
