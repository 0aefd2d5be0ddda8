use std::collections::HashMap;
use std::fmt;

use crate::cfg::{BlockId, CfgSet, Terminator};

/// Bounds that keep enumeration finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationLimits {
    /// How many times a block may be re-entered within one call frame.
    /// Routes needing more loop iterations than this are silently
    /// pruned, not reported as infeasible.
    pub max_loop_unroll: usize,
    /// How deep call inlining may nest. Deeper recursion is pruned the
    /// same way.
    pub max_call_depth: usize,
}

impl Default for EnumerationLimits {
    fn default() -> Self {
        Self {
            max_loop_unroll: 2,
            max_call_depth: 8,
        }
    }
}

/// One visited block on a path, tagged with the call frame it was
/// visited in so inlined activations stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub frame: usize,
    pub function: String,
    pub block: BlockId,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.function, self.block)
    }
}

/// An ordered block sequence from the start block to the goal block,
/// inclusive. Two paths are distinct iff their step sequences differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub steps: Vec<PathStep>,
}

impl Path {
    /// Human/machine-readable step labels, in order.
    pub fn trace(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone)]
struct Activation {
    frame: usize,
    function: String,
    /// Caller block to resume at when this frame returns; `None` for
    /// the root frame.
    return_to: Option<BlockId>,
}

#[derive(Debug, Clone)]
struct SearchNode {
    steps: Vec<PathStep>,
    call_stack: Vec<Activation>,
    block: BlockId,
    visits: HashMap<(usize, BlockId), usize>,
    next_frame: usize,
}

/// Lazy depth-first enumeration of bounded start-to-goal paths.
///
/// The graph set is shared read-only; the enumerator owns all mutable
/// search state. Finite by construction (bounded branching, bounded
/// re-entry, bounded call depth) and not restartable once exhausted.
/// Yields nothing when the goal is unreachable under the bounds.
pub struct PathEnumerator<'a> {
    cfgs: &'a CfgSet,
    limits: EnumerationLimits,
    stack: Vec<SearchNode>,
}

impl<'a> PathEnumerator<'a> {
    pub fn new(cfgs: &'a CfgSet, limits: EnumerationLimits) -> Self {
        let entry_cfg = cfgs.entry_cfg();
        let mut stack = Vec::new();
        if let Some(start) = entry_cfg.start_block {
            let root = Activation {
                frame: 0,
                function: cfgs.entry.clone(),
                return_to: None,
            };
            let step = PathStep {
                frame: 0,
                function: cfgs.entry.clone(),
                block: start,
            };
            let mut visits = HashMap::new();
            visits.insert((0, start), 1);
            stack.push(SearchNode {
                steps: vec![step],
                call_stack: vec![root],
                block: start,
                visits,
                next_frame: 1,
            });
        }
        Self {
            cfgs,
            limits,
            stack,
        }
    }

    fn at_goal(&self, node: &SearchNode) -> bool {
        let top = node.call_stack.last().expect("non-empty call stack");
        top.function == self.cfgs.entry
            && Some(node.block) == self.cfgs.entry_cfg().goal_block
    }

    /// Push a successor of `node` that stays within the current frame
    /// stack, honoring the per-frame re-entry bound.
    fn push_within(&mut self, node: &SearchNode, call_stack: Vec<Activation>, block: BlockId) {
        let top = call_stack.last().expect("non-empty call stack");
        let key = (top.frame, block);
        let count = node.visits.get(&key).copied().unwrap_or(0);
        if count > self.limits.max_loop_unroll {
            return;
        }
        let mut visits = node.visits.clone();
        visits.insert(key, count + 1);
        let mut steps = node.steps.clone();
        steps.push(PathStep {
            frame: top.frame,
            function: top.function.clone(),
            block,
        });
        self.stack.push(SearchNode {
            steps,
            call_stack,
            block,
            visits,
            next_frame: node.next_frame,
        });
    }

    fn expand(&mut self, node: SearchNode) {
        let top = node.call_stack.last().expect("non-empty call stack");
        let cfg = match self.cfgs.get(&top.function) {
            Some(cfg) => cfg,
            None => return,
        };
        match cfg.block(node.block).terminator.clone() {
            Terminator::Jump(next) => {
                self.push_within(&node, node.call_stack.clone(), next);
            }
            Terminator::Branch {
                then_blk, else_blk, ..
            } => {
                // Else first so the then-edge pops first (DFS order).
                self.push_within(&node, node.call_stack.clone(), else_blk);
                self.push_within(&node, node.call_stack.clone(), then_blk);
            }
            Terminator::Call {
                callee, return_to, ..
            } => {
                match self.cfgs.get(&callee) {
                    Some(callee_cfg) => {
                        let depth = node.call_stack.len() - 1;
                        if depth >= self.limits.max_call_depth {
                            return;
                        }
                        let mut call_stack = node.call_stack.clone();
                        let frame = node.next_frame;
                        call_stack.push(Activation {
                            frame,
                            function: callee.clone(),
                            return_to: Some(return_to),
                        });
                        let entry = callee_cfg.entry;
                        let key = (frame, entry);
                        let mut visits = node.visits.clone();
                        visits.insert(key, 1);
                        let mut steps = node.steps.clone();
                        steps.push(PathStep {
                            frame,
                            function: callee,
                            block: entry,
                        });
                        self.stack.push(SearchNode {
                            steps,
                            call_stack,
                            block: entry,
                            visits,
                            next_frame: frame + 1,
                        });
                    }
                    None => {
                        // Unknown callee: step over the call so the path
                        // still surfaces; the symbolic tracker reports it
                        // as unsupported rather than silently dropping it.
                        self.push_within(&node, node.call_stack.clone(), return_to);
                    }
                }
            }
            Terminator::Return(_) => {
                let mut call_stack = node.call_stack.clone();
                let popped = call_stack.pop().expect("non-empty call stack");
                match popped.return_to {
                    Some(resume) => self.push_within(&node, call_stack, resume),
                    None => {} // root frame exits without reaching the goal
                }
            }
            Terminator::Exit => {}
        }
    }
}

impl Iterator for PathEnumerator<'_> {
    type Item = Path;

    fn next(&mut self) -> Option<Path> {
        while let Some(node) = self.stack.pop() {
            if self.at_goal(&node) {
                return Some(Path { steps: node.steps });
            }
            self.expand(node);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_program;
    use pathgen_ast::{Expr, Function, Param, Program, Stmt, UpdateOp};

    fn nested_branch_program() -> Program {
        // if (n > 2) { if (n < 10) n++; } then goal
        Program::new().with_function(Function::new(
            "main",
            vec![Param::int("n")],
            vec![
                Stmt::PathStart,
                Stmt::If {
                    cond: Expr::var("n").gt(Expr::int(2)),
                    then_body: vec![Stmt::If {
                        cond: Expr::var("n").lt(Expr::int(10)),
                        then_body: vec![Stmt::Update {
                            name: "n".into(),
                            op: UpdateOp::Inc,
                        }],
                        else_body: vec![],
                    }],
                    else_body: vec![],
                },
                Stmt::PathGoal,
            ],
        ))
    }

    #[test]
    fn nested_branches_yield_three_paths() {
        let set = build_program(&nested_branch_program(), "main").expect("build");
        let paths: Vec<Path> = PathEnumerator::new(&set, EnumerationLimits::default()).collect();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert_eq!(
                Some(path.steps.last().expect("non-empty").block),
                set.entry_cfg().goal_block
            );
        }
    }

    #[test]
    fn loop_routes_are_bounded_by_unroll_limit() {
        // while (i < 100) i++; then goal — the loop cannot finish within
        // the bound, but the exit edge is always available, so exactly
        // the bounded unrollings are reported.
        let program = Program::new().with_function(Function::new(
            "main",
            vec![Param::int("i")],
            vec![
                Stmt::PathStart,
                Stmt::While {
                    cond: Expr::var("i").lt(Expr::int(100)),
                    body: vec![Stmt::Update {
                        name: "i".into(),
                        op: UpdateOp::Inc,
                    }],
                },
                Stmt::PathGoal,
            ],
        ));
        let set = build_program(&program, "main").expect("build");
        let limits = EnumerationLimits {
            max_loop_unroll: 2,
            max_call_depth: 8,
        };
        let paths: Vec<Path> = PathEnumerator::new(&set, limits).collect();
        // 0, 1, or 2 iterations before taking the exit edge.
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn calls_are_inlined_up_to_depth() {
        let program = Program::new()
            .with_function(Function::new(
                "id",
                vec![Param::int("x")],
                vec![Stmt::Return(Some(Expr::var("x")))],
            ))
            .with_function(Function::new(
                "main",
                vec![Param::int("n")],
                vec![
                    Stmt::PathStart,
                    Stmt::Assign {
                        name: "n".into(),
                        value: Expr::call("id", vec![Expr::var("n")]),
                    },
                    Stmt::PathGoal,
                ],
            ));
        let set = build_program(&program, "main").expect("build");
        let paths: Vec<Path> = PathEnumerator::new(&set, EnumerationLimits::default()).collect();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].steps.iter().any(|s| s.function == "id"));

        let no_inlining = EnumerationLimits {
            max_loop_unroll: 2,
            max_call_depth: 0,
        };
        let paths: Vec<Path> = PathEnumerator::new(&set, no_inlining).collect();
        assert!(paths.is_empty());
    }

    #[test]
    fn recursion_beyond_depth_is_pruned_not_reported() {
        // f calls itself unconditionally; the goal sits after the call,
        // so no bounded route ever reaches it.
        let program = Program::new()
            .with_function(Function::new(
                "f",
                vec![Param::int("x")],
                vec![Stmt::Return(Some(Expr::call("f", vec![Expr::var("x")])))],
            ))
            .with_function(Function::new(
                "main",
                vec![Param::int("n")],
                vec![
                    Stmt::PathStart,
                    Stmt::Assign {
                        name: "n".into(),
                        value: Expr::call("f", vec![Expr::var("n")]),
                    },
                    Stmt::PathGoal,
                ],
            ));
        let set = build_program(&program, "main").expect("build");
        let paths: Vec<Path> =
            PathEnumerator::new(&set, EnumerationLimits::default()).collect();
        assert!(paths.is_empty());
    }

    #[test]
    fn unknown_callee_paths_still_surface() {
        let program = Program::new().with_function(Function::new(
            "main",
            vec![Param::int("n")],
            vec![
                Stmt::PathStart,
                Stmt::Assign {
                    name: "n".into(),
                    value: Expr::call("external", vec![Expr::var("n")]),
                },
                Stmt::PathGoal,
            ],
        ));
        let set = build_program(&program, "main").expect("build");
        let paths: Vec<Path> = PathEnumerator::new(&set, EnumerationLimits::default()).collect();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn enumeration_order_is_deterministic() {
        let set = build_program(&nested_branch_program(), "main").expect("build");
        let a: Vec<Path> = PathEnumerator::new(&set, EnumerationLimits::default()).collect();
        let b: Vec<Path> = PathEnumerator::new(&set, EnumerationLimits::default()).collect();
        assert_eq!(a, b);
    }
}
