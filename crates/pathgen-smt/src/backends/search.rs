use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("undeclared variable '{0}' in assertion")]
    UndeclaredVariable(String),
}

/// Deterministic built-in satisfiability backend.
///
/// Decides conjunctions of integer constraints in two stages: interval
/// propagation over single-variable atoms proves the common
/// contradictions UNSAT, then a bounded exhaustive search in a fixed
/// value order finds a witness. `Unsat` is only ever reported when the
/// search provably covered each variable's entire domain; otherwise an
/// exhausted search yields `Unknown`, so the verdict stays sound.
/// Identical assertion sets always produce the identical verdict and
/// model.
pub struct SearchSolver {
    vars: IndexMap<String, SmtSort>,
    assertions: Vec<SmtTerm>,
    deadline: Option<Instant>,
    /// Widest interval that is still swept exhaustively.
    max_domain: i64,
    /// Half-width of the fallback sweep around zero for variables whose
    /// interval is unbounded on either side.
    probe_radius: i64,
}

impl Default for SearchSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    lo: i64,
    hi: i64,
}

impl Interval {
    const FULL: Interval = Interval {
        lo: i64::MIN,
        hi: i64::MAX,
    };

    fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    fn bounded(&self) -> bool {
        self.lo > i64::MIN && self.hi < i64::MAX
    }

    fn contains(&self, v: i64) -> bool {
        self.lo <= v && v <= self.hi
    }
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl SearchSolver {
    pub fn new() -> Self {
        Self {
            vars: IndexMap::new(),
            assertions: Vec::new(),
            deadline: None,
            max_domain: 4096,
            probe_radius: 64,
        }
    }

    fn deadline_exceeded(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Interpret `term` as `name <op> constant` if it has that shape
    /// (possibly through negation or with the constant on the left).
    fn as_interval_atom(term: &SmtTerm) -> Option<(&str, CmpOp, i64)> {
        let flip = |op: CmpOp| match op {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        };
        let negate = |op: CmpOp| match op {
            // `not (a = b)` carries no interval information.
            CmpOp::Eq => None,
            CmpOp::Lt => Some(CmpOp::Ge),
            CmpOp::Le => Some(CmpOp::Gt),
            CmpOp::Gt => Some(CmpOp::Le),
            CmpOp::Ge => Some(CmpOp::Lt),
        };

        let (op, lhs, rhs) = match term {
            SmtTerm::Eq(a, b) => (CmpOp::Eq, a, b),
            SmtTerm::Lt(a, b) => (CmpOp::Lt, a, b),
            SmtTerm::Le(a, b) => (CmpOp::Le, a, b),
            SmtTerm::Gt(a, b) => (CmpOp::Gt, a, b),
            SmtTerm::Ge(a, b) => (CmpOp::Ge, a, b),
            SmtTerm::Not(inner) => {
                let (name, op, c) = Self::as_interval_atom(inner)?;
                return negate(op).map(|op| (name, op, c));
            }
            _ => return None,
        };

        let empty = Model::default();
        if let SmtTerm::Var(name) = lhs.as_ref() {
            if let Some(c) = rhs.eval_int(&empty) {
                return Some((name, op, c));
            }
        }
        if let SmtTerm::Var(name) = rhs.as_ref() {
            if let Some(c) = lhs.eval_int(&empty) {
                return Some((name, flip(op), c));
            }
        }
        None
    }

    fn refine(term: &SmtTerm, intervals: &mut HashMap<String, Interval>) -> bool {
        match term {
            SmtTerm::And(terms) => terms.iter().all(|t| Self::refine(t, intervals)),
            SmtTerm::BoolLit(false) => false,
            _ => {
                if let Some((name, op, c)) = Self::as_interval_atom(term) {
                    if let Some(iv) = intervals.get_mut(name) {
                        match op {
                            CmpOp::Eq => {
                                iv.lo = iv.lo.max(c);
                                iv.hi = iv.hi.min(c);
                            }
                            CmpOp::Lt => iv.hi = iv.hi.min(c.saturating_sub(1)),
                            CmpOp::Le => iv.hi = iv.hi.min(c),
                            CmpOp::Gt => iv.lo = iv.lo.max(c.saturating_add(1)),
                            CmpOp::Ge => iv.lo = iv.lo.max(c),
                        }
                        if iv.is_empty() {
                            return false;
                        }
                    }
                }
                true
            }
        }
    }

    fn collect_literals(term: &SmtTerm, out: &mut Vec<i64>) {
        match term {
            SmtTerm::IntLit(n) => out.push(*n),
            SmtTerm::Var(_) | SmtTerm::BoolLit(_) => {}
            SmtTerm::Add(a, b)
            | SmtTerm::Sub(a, b)
            | SmtTerm::Mul(a, b)
            | SmtTerm::Div(a, b)
            | SmtTerm::Rem(a, b)
            | SmtTerm::Eq(a, b)
            | SmtTerm::Lt(a, b)
            | SmtTerm::Le(a, b)
            | SmtTerm::Gt(a, b)
            | SmtTerm::Ge(a, b) => {
                Self::collect_literals(a, out);
                Self::collect_literals(b, out);
            }
            SmtTerm::And(ts) | SmtTerm::Or(ts) => {
                for t in ts {
                    Self::collect_literals(t, out);
                }
            }
            SmtTerm::Not(inner) => Self::collect_literals(inner, out),
        }
    }

    /// Candidate values for one integer variable, smallest magnitude
    /// first so witnesses stay small and the order is reproducible.
    fn int_candidates(&self, interval: Interval, literals: &[i64]) -> (Vec<i64>, bool) {
        let width_fits = interval
            .hi
            .checked_sub(interval.lo)
            .is_some_and(|w| w <= self.max_domain);
        if interval.bounded() && width_fits {
            let mut values: Vec<i64> = (interval.lo..=interval.hi).collect();
            values.sort_by_key(|v| (v.unsigned_abs(), *v < 0));
            return (values, true);
        }

        let mut values: Vec<i64> = Vec::new();
        for probe in -self.probe_radius..=self.probe_radius {
            values.push(probe);
        }
        for &lit in literals {
            for delta in -1..=1 {
                values.push(lit.saturating_add(delta));
            }
        }
        for endpoint in [interval.lo, interval.hi] {
            if endpoint > i64::MIN && endpoint < i64::MAX {
                for delta in 0..=self.probe_radius.min(8) {
                    values.push(endpoint.saturating_add(delta));
                    values.push(endpoint.saturating_sub(delta));
                }
            }
        }
        values.retain(|v| interval.contains(*v));
        values.sort_by_key(|v| (v.unsigned_abs(), *v < 0));
        values.dedup();
        (values, false)
    }

    fn evaluate_all(&self, model: &Model) -> bool {
        self.assertions
            .iter()
            .all(|a| a.eval_bool(model) == Some(true))
    }
}

impl SmtSolver for SearchSolver {
    type Error = SearchError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SearchError> {
        self.vars.insert(name.to_string(), *sort);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), SearchError> {
        let mut names = Vec::new();
        term.collect_vars(&mut names);
        for name in names {
            if !self.vars.contains_key(&name) {
                return Err(SearchError::UndeclaredVariable(name));
            }
        }
        self.assertions.push(term.clone());
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, SearchError> {
        let vars: Vec<(String, SmtSort)> = self
            .vars
            .iter()
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        let refs: Vec<(&str, &SmtSort)> = vars.iter().map(|(n, s)| (n.as_str(), s)).collect();
        let (result, _) = self.check_sat_with_model(&refs)?;
        Ok(result)
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SearchError> {
        // Stage 1: interval propagation over the asserted conjuncts.
        let mut intervals: HashMap<String, Interval> = self
            .vars
            .keys()
            .map(|n| (n.clone(), Interval::FULL))
            .collect();
        for assertion in &self.assertions {
            if !Self::refine(assertion, &mut intervals) {
                return Ok((SatResult::Unsat, None));
            }
        }

        let mut literals = Vec::new();
        for assertion in &self.assertions {
            Self::collect_literals(assertion, &mut literals);
        }

        // Stage 2: bounded exhaustive search, declaration order, fixed
        // value order.
        let mut domains: Vec<(String, SmtSort, Vec<i64>, bool)> = Vec::new();
        let mut complete = true;
        for (name, sort) in &self.vars {
            match sort {
                SmtSort::Bool => {
                    domains.push((name.clone(), *sort, vec![0, 1], true));
                }
                SmtSort::Int => {
                    let (values, exhaustive) =
                        self.int_candidates(intervals[name], &literals);
                    complete &= exhaustive;
                    domains.push((name.clone(), *sort, values, exhaustive));
                }
            }
        }

        let mut model = Model::default();
        let mut checked: u64 = 0;
        match self.search(&domains, 0, &mut model, &mut checked) {
            SearchOutcome::Found => {
                let mut out = Model::default();
                for &(name, sort) in var_names {
                    match sort {
                        SmtSort::Int => {
                            let v = model.get_int(name).unwrap_or(0);
                            out.values.insert(name.to_string(), ModelValue::Int(v));
                        }
                        SmtSort::Bool => {
                            let v = model.get_bool(name).unwrap_or(false);
                            out.values.insert(name.to_string(), ModelValue::Bool(v));
                        }
                    }
                }
                Ok((SatResult::Sat, Some(out)))
            }
            SearchOutcome::TimedOut => Ok((
                SatResult::Unknown("timeout during bounded search".to_string()),
                None,
            )),
            SearchOutcome::Exhausted => {
                if complete {
                    Ok((SatResult::Unsat, None))
                } else {
                    Ok((
                        SatResult::Unknown(
                            "bounded search exhausted without a model".to_string(),
                        ),
                        None,
                    ))
                }
            }
        }
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn reset(&mut self) -> Result<(), SearchError> {
        self.vars.clear();
        self.assertions.clear();
        self.deadline = None;
        Ok(())
    }
}

enum SearchOutcome {
    Found,
    Exhausted,
    TimedOut,
}

impl SearchSolver {
    fn search(
        &self,
        domains: &[(String, SmtSort, Vec<i64>, bool)],
        index: usize,
        model: &mut Model,
        checked: &mut u64,
    ) -> SearchOutcome {
        if index == domains.len() {
            *checked += 1;
            if *checked % 1024 == 0 && self.deadline_exceeded() {
                return SearchOutcome::TimedOut;
            }
            return if self.evaluate_all(model) {
                SearchOutcome::Found
            } else {
                SearchOutcome::Exhausted
            };
        }

        let (name, sort, values, _) = &domains[index];
        for &v in values {
            let value = match sort {
                SmtSort::Int => ModelValue::Int(v),
                SmtSort::Bool => ModelValue::Bool(v != 0),
            };
            model.values.insert(name.clone(), value);
            match self.search(domains, index + 1, model, checked) {
                SearchOutcome::Found => return SearchOutcome::Found,
                SearchOutcome::TimedOut => return SearchOutcome::TimedOut,
                SearchOutcome::Exhausted => {}
            }
        }
        model.values.remove(name);
        SearchOutcome::Exhausted
    }
}
