use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Concrete input values proving one path condition satisfiable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Witness {
    /// Input symbol name to value, in first-use order.
    pub values: IndexMap<String, i64>,
}

impl Witness {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name} = {value}")?;
            first = false;
        }
        if first {
            write!(f, "(no inputs)")?;
        }
        Ok(())
    }
}

/// The verdict for one enumerated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PathVerdict {
    /// The path condition is satisfiable; `witness` drives execution
    /// along this path.
    Feasible { witness: Witness },
    /// No input can drive execution along this path.
    Infeasible,
    /// The path could not be decided (unsupported construct, solver
    /// timeout, or an incomplete search).
    Unknown { reason: String },
}

impl PathVerdict {
    /// Machine-readable verdict class for reproducibility checks.
    ///
    /// Stable across runs: depends only on the variant, not on witness
    /// values or reason strings.
    pub fn verdict_class(&self) -> &'static str {
        match self {
            PathVerdict::Feasible { .. } => "feasible",
            PathVerdict::Infeasible => "infeasible",
            PathVerdict::Unknown { .. } => "unknown",
        }
    }
}

/// One analyzed path: where it went, what it requires, and the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathResult {
    /// Position in the final report, in enumeration order.
    pub index: usize,
    /// Block labels visited, start to goal inclusive.
    pub trace: Vec<String>,
    /// The path condition, one rendered conjunct per taken branch.
    pub condition: Vec<String>,
    pub verdict: PathVerdict,
}

/// The final, ordered result set of one analysis run.
///
/// Every discovered path appears exactly once with one of the three
/// verdicts; logically equivalent duplicates are merged before this
/// report is built.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub results: Vec<PathResult>,
}

impl AnalysisReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathResult> {
        self.results.iter()
    }

    pub fn feasible(&self) -> impl Iterator<Item = &PathResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.verdict, PathVerdict::Feasible { .. }))
    }

    pub fn any_feasible(&self) -> bool {
        self.feasible().next().is_some()
    }

    /// Overall summary: "feasible" if any path has a witness,
    /// "infeasible" if every path is proved out, else "unknown".
    pub fn overall_verdict(&self) -> &'static str {
        if self.any_feasible() {
            "feasible"
        } else if self
            .results
            .iter()
            .all(|r| r.verdict == PathVerdict::Infeasible)
            && !self.results.is_empty()
        {
            "infeasible"
        } else {
            "unknown"
        }
    }
}

impl IntoIterator for AnalysisReport {
    type Item = PathResult;
    type IntoIter = std::vec::IntoIter<PathResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PATHS DISCOVERED: {}", self.results.len())?;
        for result in &self.results {
            write!(f, "Path {}: ", result.index)?;
            match &result.verdict {
                PathVerdict::Feasible { witness } => {
                    writeln!(f, "FEASIBLE with {witness}")?;
                }
                PathVerdict::Infeasible => writeln!(f, "INFEASIBLE")?,
                PathVerdict::Unknown { reason } => writeln!(f, "UNKNOWN ({reason})")?,
            }
            if !result.condition.is_empty() {
                writeln!(f, "  condition: {}", result.condition.join(" & "))?;
            }
            writeln!(f, "  blocks: {}", result.trace.join(" -> "))?;
        }
        Ok(())
    }
}

/// Collects per-path verdicts, merging paths whose conditions are the
/// same predicate set up to reordering (syntactically different loop
/// unrollings often solve to identical conditions).
#[derive(Debug, Default)]
pub struct Aggregator {
    seen: IndexSet<String>,
    results: Vec<PathResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one path outcome. Returns false when an equivalent path
    /// was already recorded and this one was merged away.
    pub fn insert(
        &mut self,
        dedup_key: String,
        trace: Vec<String>,
        condition: Vec<String>,
        verdict: PathVerdict,
    ) -> bool {
        if !self.seen.insert(dedup_key) {
            return false;
        }
        let index = self.results.len();
        self.results.push(PathResult {
            index,
            trace,
            condition,
            verdict,
        });
        true
    }

    pub fn into_report(self) -> AnalysisReport {
        AnalysisReport {
            results: self.results,
        }
    }
}
