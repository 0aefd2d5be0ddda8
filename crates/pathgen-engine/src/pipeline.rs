use std::time::Duration;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use pathgen_ast::Program;
use pathgen_cfg::{build_program, EnumerationLimits, MalformedFunctionError, Path, PathEnumerator};

use crate::adapter::{SolverAdapter, SolverChoice};
use crate::result::{Aggregator, AnalysisReport, PathVerdict};
use crate::symbolic::replay_path;

/// Errors that abort the whole analysis of a function.
///
/// Per-path failures never surface here: an unsupported construct or a
/// solver timeout downgrades the affected path to `Unknown` while the
/// rest of the analysis continues.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("malformed function: {0}")]
    Malformed(#[from] MalformedFunctionError),
}

/// Options for one analysis run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    /// Loop re-entry bound during enumeration.
    pub max_loop_unroll: usize,
    /// Call inlining depth bound.
    pub max_call_depth: usize,
    /// Per-path solving budget; expiry yields `Unknown`, not a stall.
    pub solver_timeout: Duration,
    /// How many paths are in flight at once. Bounds memory when the
    /// solver is slower than enumeration.
    pub batch_size: usize,
    /// Which backend decides path conditions.
    pub solver: SolverChoice,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_loop_unroll: 2,
            max_call_depth: 8,
            solver_timeout: Duration::from_secs(5),
            batch_size: 64,
            solver: SolverChoice::default(),
        }
    }
}

/// Run the full analysis of `entry`: build the graphs once, enumerate
/// bounded start-to-goal paths, replay each one symbolically, decide
/// its condition, and aggregate deduplicated verdicts.
///
/// Paths are independent, so each batch is replayed and solved in
/// parallel; results merge back in enumeration order, which keeps the
/// report deterministic for fixed inputs and options.
pub fn analyze(
    program: &Program,
    entry: &str,
    options: &AnalysisOptions,
) -> Result<AnalysisReport, AnalysisError> {
    let cfgs = build_program(program, entry)?;
    info!(entry, functions = cfgs.cfgs.len(), "built control-flow graphs");

    let limits = EnumerationLimits {
        max_loop_unroll: options.max_loop_unroll,
        max_call_depth: options.max_call_depth,
    };
    let adapter = SolverAdapter::new(options.solver, options.solver_timeout);
    let mut enumerator = PathEnumerator::new(&cfgs, limits);
    let mut aggregator = Aggregator::new();
    let batch_size = options.batch_size.max(1);

    loop {
        let batch: Vec<Path> = enumerator.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        debug!(paths = batch.len(), "solving path batch");

        let solved: Vec<(String, Vec<String>, PathVerdict)> = batch
            .par_iter()
            .map(|path| match replay_path(&cfgs, program, path) {
                Ok(replayed) => {
                    let verdict = adapter.decide(&replayed);
                    (
                        replayed.condition.canonical_key(),
                        replayed.condition.render(),
                        verdict,
                    )
                }
                Err(err) => {
                    warn!(%err, "path downgraded to unknown");
                    // No condition to key on; the block sequence itself
                    // is the path's identity.
                    (
                        path.trace().join(" "),
                        Vec::new(),
                        PathVerdict::Unknown {
                            reason: err.to_string(),
                        },
                    )
                }
            })
            .collect();

        for (path, (key, condition, verdict)) in batch.iter().zip(solved) {
            aggregator.insert(key, path.trace(), condition, verdict);
        }
    }

    let report = aggregator.into_report();
    info!(
        paths = report.len(),
        verdict = report.overall_verdict(),
        "analysis complete"
    );
    Ok(report)
}
