use std::time::{Duration, Instant};

use indexmap::IndexMap;

use pathgen_smt::backends::search::SearchSolver;
#[cfg(feature = "z3")]
use pathgen_smt::backends::z3_backend::Z3Solver;
use pathgen_smt::solver::{SatResult, SmtSolver};
use pathgen_smt::sorts::SmtSort;

use crate::result::{PathVerdict, Witness};
use crate::symbolic::ReplayOutcome;

/// Which solver backend decides path conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    /// Built-in deterministic interval+search backend.
    #[default]
    Search,
    #[cfg(feature = "z3")]
    Z3,
}

/// Wraps a solver backend behind the contract the pipeline needs:
/// deterministic across repeated calls, bounded by a per-query
/// deadline, and sound — a backend failure or timeout becomes an
/// `Unknown` verdict, never a wrong one.
#[derive(Debug, Clone, Copy)]
pub struct SolverAdapter {
    choice: SolverChoice,
    timeout: Duration,
}

impl SolverAdapter {
    pub fn new(choice: SolverChoice, timeout: Duration) -> Self {
        Self { choice, timeout }
    }

    /// Decide one fully-replayed path condition.
    pub fn decide(&self, replayed: &ReplayOutcome) -> PathVerdict {
        match self.choice {
            SolverChoice::Search => self.run(SearchSolver::new(), replayed),
            #[cfg(feature = "z3")]
            SolverChoice::Z3 => self.run(Z3Solver::new(), replayed),
        }
    }

    fn run<S: SmtSolver>(&self, mut solver: S, replayed: &ReplayOutcome) -> PathVerdict {
        solver.set_deadline(Some(Instant::now() + self.timeout));

        for (name, sort) in &replayed.inputs {
            if let Err(e) = solver.declare_var(name, sort) {
                return PathVerdict::Unknown {
                    reason: format!("solver error: {e}"),
                };
            }
        }
        for conjunct in replayed.condition.conjuncts() {
            if let Err(e) = solver.assert(conjunct) {
                return PathVerdict::Unknown {
                    reason: format!("solver error: {e}"),
                };
            }
        }

        let vars: Vec<(&str, &SmtSort)> = replayed
            .inputs
            .iter()
            .map(|(name, sort)| (name.as_str(), sort))
            .collect();
        match solver.check_sat_with_model(&vars) {
            Ok((SatResult::Sat, Some(model))) => {
                let mut values = IndexMap::new();
                for (name, _) in &replayed.inputs {
                    values.insert(name.clone(), model.get_int(name).unwrap_or(0));
                }
                PathVerdict::Feasible {
                    witness: Witness { values },
                }
            }
            Ok((SatResult::Sat, None)) => PathVerdict::Unknown {
                reason: "solver reported SAT without a model".to_string(),
            },
            Ok((SatResult::Unsat, _)) => PathVerdict::Infeasible,
            Ok((SatResult::Unknown(reason), _)) => PathVerdict::Unknown { reason },
            Err(e) => PathVerdict::Unknown {
                reason: format!("solver error: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::PathCondition;
    use pathgen_smt::terms::SmtTerm;

    fn replayed(conjuncts: Vec<SmtTerm>) -> ReplayOutcome {
        let mut inputs = IndexMap::new();
        let mut names = Vec::new();
        for c in &conjuncts {
            c.collect_vars(&mut names);
        }
        for name in names {
            inputs.insert(name, SmtSort::Int);
        }
        ReplayOutcome {
            condition: PathCondition::from_conjuncts(conjuncts),
            inputs,
        }
    }

    fn adapter() -> SolverAdapter {
        SolverAdapter::new(SolverChoice::Search, Duration::from_secs(5))
    }

    #[test]
    fn satisfiable_condition_yields_a_witness_that_checks_out() {
        let outcome = replayed(vec![
            SmtTerm::var("n").gt(SmtTerm::int(2)),
            SmtTerm::var("n").lt(SmtTerm::int(10)),
        ]);
        match adapter().decide(&outcome) {
            PathVerdict::Feasible { witness } => {
                let n = witness.get("n").expect("n in witness");
                assert!(n > 2 && n < 10);
            }
            other => panic!("expected Feasible, got {other:?}"),
        }
    }

    #[test]
    fn contradictory_condition_is_infeasible() {
        let outcome = replayed(vec![
            SmtTerm::var("n").gt(SmtTerm::int(2)),
            SmtTerm::var("n").le(SmtTerm::int(2)),
        ]);
        assert_eq!(adapter().decide(&outcome), PathVerdict::Infeasible);
    }

    #[test]
    fn empty_condition_is_trivially_feasible() {
        let outcome = replayed(vec![]);
        match adapter().decide(&outcome) {
            PathVerdict::Feasible { witness } => assert!(witness.values.is_empty()),
            other => panic!("expected Feasible, got {other:?}"),
        }
    }

    #[test]
    fn decisions_are_deterministic() {
        let outcome = replayed(vec![SmtTerm::var("n").ge(SmtTerm::int(7))]);
        let first = adapter().decide(&outcome);
        let second = adapter().decide(&outcome);
        assert_eq!(first, second);
    }
}
