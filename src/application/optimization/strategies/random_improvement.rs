use super::{Candidate, Proposal, covers_space, random_assignment, random_value};
use crate::domain::optimization::parameter::ParameterSpace;
use crate::domain::optimization::test_run::TestRun;
use rand::Rng;

/// Changes one randomly chosen parameter of the best assignment.
///
/// Without a best result yet, every parameter is drawn at random instead.
pub fn next<R: Rng + ?Sized>(space: &ParameterSpace, run: &TestRun, rng: &mut R) -> Proposal {
    if run.best_value.is_none() || !covers_space(&run.best_assignment, space) {
        return Proposal::Evaluate(Candidate {
            assignment: random_assignment(space, rng).expand(&run.best_assignment),
            message: "All parameters are changed randomly".to_string(),
        });
    }

    // Only parameters with somewhere else to go.
    let names: Vec<&str> = space
        .iter()
        .filter(|(name, values)| {
            let current = run.best_assignment.get(name);
            values.iter().any(|v| Some(v) != current)
        })
        .map(|(name, _)| name)
        .collect();
    let Some(&name) = names.get(rng.random_range(0..names.len().max(1))) else {
        return Proposal::Skip {
            message: "Every parameter has a single value".to_string(),
        };
    };
    let values = space.values(name).unwrap_or_default();
    let current = run.best_assignment.get(name);

    let alternatives: Vec<_> = values.iter().filter(|v| Some(*v) != current).cloned().collect();
    let Some(value) = random_value(&alternatives, rng).cloned() else {
        return Proposal::Skip {
            message: format!("The \"{}\" parameter has a single value", name),
        };
    };

    let message = match current {
        Some(old) => format!("Changed \"{}\": {} => {}.", name, old, value),
        None => format!("\"{}\" set to {}.", name, value),
    };
    let mut assignment = run.best_assignment.clone();
    assignment.set(name, value);
    Proposal::Evaluate(Candidate { assignment, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::optimization::strategies::test_support::{int_space, run_with_best};
    use crate::domain::optimization::parameter::ParameterAssignment;
    use crate::domain::optimization::test_run::OptimizationMethod;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_changes_exactly_one_parameter() {
        let space = int_space(&[("A", &[1, 2, 3]), ("B", &[10, 20, 30])]);
        let best = ParameterAssignment::new().with("A", 2).with("B", 20);
        let run = run_with_best(OptimizationMethod::RandomImprovement, &[], best.clone(), Some(5.0), 10);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..30 {
            let Proposal::Evaluate(candidate) = next(&space, &run, &mut rng) else {
                panic!("expected a candidate");
            };
            let changed: Vec<_> = candidate
                .assignment
                .iter()
                .filter(|(name, value)| best.get(name) != Some(*value))
                .collect();
            assert_eq!(changed.len(), 1, "{}", candidate.assignment);
            assert!(candidate.message.starts_with("Changed \""));
        }
    }

    #[test]
    fn test_without_best_draws_everything() {
        let space = int_space(&[("A", &[1, 2, 3])]);
        let run = run_with_best(
            OptimizationMethod::RandomImprovement,
            &[],
            ParameterAssignment::new(),
            None,
            10,
        );
        let mut rng = StdRng::seed_from_u64(2);
        let Proposal::Evaluate(candidate) = next(&space, &run, &mut rng) else {
            panic!("expected a candidate");
        };
        assert_eq!(candidate.message, "All parameters are changed randomly");
        assert!(candidate.assignment.get("A").is_some());
    }

    #[test]
    fn test_single_value_parameters_are_never_picked() {
        let space = int_space(&[("A", &[1]), ("B", &[10, 20, 30]), ("C", &[5])]);
        let best = ParameterAssignment::new().with("A", 1).with("B", 20).with("C", 5);
        let run = run_with_best(OptimizationMethod::RandomImprovement, &[], best, Some(5.0), 10);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..30 {
            let Proposal::Evaluate(candidate) = next(&space, &run, &mut rng) else {
                panic!("a parameter with alternatives exists");
            };
            assert!(candidate.message.starts_with("Changed \"B\""), "{}", candidate.message);
        }
    }

    #[test]
    fn test_single_value_parameter_is_skipped() {
        let space = int_space(&[("A", &[1])]);
        let best = ParameterAssignment::new().with("A", 1);
        let run = run_with_best(OptimizationMethod::RandomImprovement, &[], best, Some(1.0), 10);
        let mut rng = StdRng::seed_from_u64(2);
        assert!(matches!(next(&space, &run, &mut rng), Proposal::Skip { .. }));
    }
}
