use indexmap::IndexMap;
use std::collections::HashSet;
use thiserror::Error;

use pathgen_ast::{BinOp, Expr, Function, Program, Stmt, UpdateOp};

use crate::cfg::{BasicBlock, BlockId, Cfg, CfgSet, Instr, Terminator};

/// Structural precondition violated while building a function's graph.
///
/// Fatal for the whole analysis of that function: no partial result is
/// produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedFunctionError {
    #[error("unknown entry function '{0}'")]
    UnknownEntry(String),
    #[error("function '{0}' has no path_start marker")]
    MissingStart(String),
    #[error("function '{0}' has no path_goal marker")]
    MissingGoal(String),
    #[error("duplicate path_start marker in function '{0}'")]
    DuplicateStart(String),
    #[error("duplicate path_goal marker in function '{0}'")]
    DuplicateGoal(String),
    #[error("path_start marker in function '{0}' is unreachable from the function entry")]
    UnreachableStart(String),
    #[error("path_goal marker in function '{0}' is unreachable from the function entry")]
    UnreachableGoal(String),
    #[error("marker in function '{0}', outside the analysis entry")]
    MarkerOutsideEntry(String),
}

/// Build the graphs for every function in `program`, validating the
/// marker contract on the designated `entry` function.
pub fn build_program(program: &Program, entry: &str) -> Result<CfgSet, MalformedFunctionError> {
    if program.get(entry).is_none() {
        return Err(MalformedFunctionError::UnknownEntry(entry.to_string()));
    }

    let mut cfgs = IndexMap::new();
    for (name, function) in &program.functions {
        let cfg = Lowering::new(function, name == entry).run()?;
        cfgs.insert(name.clone(), cfg);
    }

    Ok(CfgSet {
        cfgs,
        entry: entry.to_string(),
    })
}

/// Lowers one function's statement tree into basic blocks.
///
/// Blocks are split at every conditional, loop header, call boundary,
/// and marker, so each block carries straight-line instructions and at
/// most one branch decision. Statements that follow a `return` are
/// still lowered (into blocks with no incoming edge) so that markers
/// placed there are diagnosed as unreachable rather than missing.
struct Lowering<'a> {
    function: &'a Function,
    is_entry: bool,
    blocks: Vec<BasicBlock>,
    start: Option<BlockId>,
    goal: Option<BlockId>,
    temp_counter: usize,
}

impl<'a> Lowering<'a> {
    fn new(function: &'a Function, is_entry: bool) -> Self {
        Self {
            function,
            is_entry,
            blocks: Vec::new(),
            start: None,
            goal: None,
            temp_counter: 0,
        }
    }

    fn run(mut self) -> Result<Cfg, MalformedFunctionError> {
        let entry = self.new_block();
        let body: &[Stmt] = self.function.body.as_slice();
        let end = self.lower_stmts(body, entry)?;
        // Falling off the end: the analysis entry simply exits, callees
        // return without a value.
        let terminator = if self.is_entry {
            Terminator::Exit
        } else {
            Terminator::Return(None)
        };
        self.set_term(end, terminator);

        if self.is_entry {
            let name = self.function.name.clone();
            let start = self
                .start
                .ok_or_else(|| MalformedFunctionError::MissingStart(name.clone()))?;
            let goal = self
                .goal
                .ok_or_else(|| MalformedFunctionError::MissingGoal(name.clone()))?;

            let reachable = self.reachable_from(entry);
            if !reachable.contains(&start) {
                return Err(MalformedFunctionError::UnreachableStart(name));
            }
            if !reachable.contains(&goal) {
                return Err(MalformedFunctionError::UnreachableGoal(name));
            }
        }

        Ok(Cfg {
            blocks: self.blocks,
            entry,
            start_block: self.start,
            goal_block: self.goal,
        })
    }

    fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock {
            instrs: Vec::new(),
            terminator: Terminator::Exit,
        });
        self.blocks.len() - 1
    }

    fn set_term(&mut self, id: BlockId, terminator: Terminator) {
        self.blocks[id].terminator = terminator;
    }

    fn push_instr(&mut self, id: BlockId, instr: Instr) {
        self.blocks[id].instrs.push(instr);
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("__t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn lower_stmts(
        &mut self,
        stmts: &[Stmt],
        mut cur: BlockId,
    ) -> Result<BlockId, MalformedFunctionError> {
        for stmt in stmts {
            cur = self.lower_stmt(stmt, cur)?;
        }
        Ok(cur)
    }

    fn lower_stmt(&mut self, stmt: &Stmt, cur: BlockId) -> Result<BlockId, MalformedFunctionError> {
        match stmt {
            Stmt::Decl { name, init } => match init {
                Some(init) => {
                    let (value, cur) = self.flatten_expr(init, cur)?;
                    self.push_instr(
                        cur,
                        Instr::Assign {
                            name: name.clone(),
                            value,
                        },
                    );
                    Ok(cur)
                }
                None => Ok(cur),
            },
            Stmt::Havoc { name } => {
                self.push_instr(cur, Instr::Havoc { name: name.clone() });
                Ok(cur)
            }
            Stmt::Assign { name, value } => {
                let (value, cur) = self.flatten_expr(value, cur)?;
                self.push_instr(
                    cur,
                    Instr::Assign {
                        name: name.clone(),
                        value,
                    },
                );
                Ok(cur)
            }
            Stmt::Update { name, op } => {
                let one = Expr::Int(1);
                let value = match op {
                    UpdateOp::Inc => Expr::var(name.clone()).add(one),
                    UpdateOp::Dec => Expr::var(name.clone()).sub(one),
                };
                self.push_instr(
                    cur,
                    Instr::Assign {
                        name: name.clone(),
                        value,
                    },
                );
                Ok(cur)
            }
            Stmt::CompoundAssign { name, op, value } => {
                let (rhs, cur) = self.flatten_expr(value, cur)?;
                let value = Expr::Binary(*op, Box::new(Expr::var(name.clone())), Box::new(rhs));
                self.push_instr(
                    cur,
                    Instr::Assign {
                        name: name.clone(),
                        value,
                    },
                );
                Ok(cur)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let (cond, cur) = self.flatten_expr(cond, cur)?;
                let then_entry = self.new_block();
                let else_entry = self.new_block();
                self.set_term(
                    cur,
                    Terminator::Branch {
                        cond,
                        then_blk: then_entry,
                        else_blk: else_entry,
                    },
                );
                let then_end = self.lower_stmts(then_body, then_entry)?;
                let else_end = self.lower_stmts(else_body, else_entry)?;
                let join = self.new_block();
                self.set_term(then_end, Terminator::Jump(join));
                self.set_term(else_end, Terminator::Jump(join));
                Ok(join)
            }
            Stmt::While { cond, body } => {
                let header = self.new_block();
                self.set_term(cur, Terminator::Jump(header));
                let (cond, header_end) = self.flatten_expr(cond, header)?;
                let body_entry = self.new_block();
                let exit_blk = self.new_block();
                self.set_term(
                    header_end,
                    Terminator::Branch {
                        cond,
                        then_blk: body_entry,
                        else_blk: exit_blk,
                    },
                );
                let body_end = self.lower_stmts(body, body_entry)?;
                self.set_term(body_end, Terminator::Jump(header));
                Ok(exit_blk)
            }
            Stmt::Return(expr) => {
                let (value, cur) = match expr {
                    Some(expr) => {
                        let (value, cur) = self.flatten_expr(expr, cur)?;
                        (Some(value), cur)
                    }
                    None => (None, cur),
                };
                self.set_term(cur, Terminator::Return(value));
                // Continue lowering into a block with no incoming edge so
                // that anything placed after the return is still present
                // in the graph and diagnosable as unreachable.
                Ok(self.new_block())
            }
            Stmt::Expr(expr) => {
                if let Expr::Call(callee, args) = expr {
                    // Bare call: no destination binding.
                    let mut cur = cur;
                    let mut flat_args = Vec::with_capacity(args.len());
                    for arg in args {
                        let (arg, next) = self.flatten_expr(arg, cur)?;
                        flat_args.push(arg);
                        cur = next;
                    }
                    let cont = self.new_block();
                    self.set_term(
                        cur,
                        Terminator::Call {
                            callee: callee.clone(),
                            args: flat_args,
                            dest: None,
                            return_to: cont,
                        },
                    );
                    Ok(cont)
                } else {
                    // Effect-free expression statement: nothing to keep.
                    let (_, cur) = self.flatten_expr(expr, cur)?;
                    Ok(cur)
                }
            }
            Stmt::PathStart => {
                if !self.is_entry {
                    return Err(MalformedFunctionError::MarkerOutsideEntry(
                        self.function.name.clone(),
                    ));
                }
                if self.start.is_some() {
                    return Err(MalformedFunctionError::DuplicateStart(
                        self.function.name.clone(),
                    ));
                }
                let marked = self.new_block();
                self.set_term(cur, Terminator::Jump(marked));
                self.start = Some(marked);
                Ok(marked)
            }
            Stmt::PathGoal => {
                if !self.is_entry {
                    return Err(MalformedFunctionError::MarkerOutsideEntry(
                        self.function.name.clone(),
                    ));
                }
                if self.goal.is_some() {
                    return Err(MalformedFunctionError::DuplicateGoal(
                        self.function.name.clone(),
                    ));
                }
                let marked = self.new_block();
                self.set_term(cur, Terminator::Jump(marked));
                self.goal = Some(marked);
                Ok(marked)
            }
        }
    }

    /// Rewrite `expr` so no call remains inside it: each call is hoisted
    /// onto its own call edge with a fresh temporary as destination.
    fn flatten_expr(
        &mut self,
        expr: &Expr,
        cur: BlockId,
    ) -> Result<(Expr, BlockId), MalformedFunctionError> {
        match expr {
            Expr::Int(_) | Expr::Var(_) => Ok((expr.clone(), cur)),
            Expr::Unary(op, inner) => {
                let (inner, cur) = self.flatten_expr(inner, cur)?;
                Ok((Expr::Unary(*op, Box::new(inner)), cur))
            }
            Expr::Binary(op, lhs, rhs) => {
                let (lhs, cur) = self.flatten_expr(lhs, cur)?;
                let (rhs, cur) = self.flatten_expr(rhs, cur)?;
                Ok((Expr::Binary(*op, Box::new(lhs), Box::new(rhs)), cur))
            }
            Expr::Call(callee, args) => {
                let mut cur = cur;
                let mut flat_args = Vec::with_capacity(args.len());
                for arg in args {
                    let (arg, next) = self.flatten_expr(arg, cur)?;
                    flat_args.push(arg);
                    cur = next;
                }
                let dest = self.fresh_temp();
                let cont = self.new_block();
                self.set_term(
                    cur,
                    Terminator::Call {
                        callee: callee.clone(),
                        args: flat_args,
                        dest: Some(dest.clone()),
                        return_to: cont,
                    },
                );
                Ok((Expr::Var(dest), cont))
            }
        }
    }

    fn reachable_from(&self, entry: BlockId) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut work = vec![entry];
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            match &self.blocks[id].terminator {
                Terminator::Jump(next) => work.push(*next),
                Terminator::Branch {
                    then_blk, else_blk, ..
                } => {
                    work.push(*then_blk);
                    work.push(*else_blk);
                }
                Terminator::Call { return_to, .. } => work.push(*return_to),
                Terminator::Return(_) | Terminator::Exit => {}
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathgen_ast::Param;

    fn entry_fn(body: Vec<Stmt>) -> Program {
        Program::new().with_function(Function::new("main", vec![Param::int("n")], body))
    }

    #[test]
    fn straight_line_function_resolves_both_markers() {
        let program = entry_fn(vec![
            Stmt::PathStart,
            Stmt::Assign {
                name: "n".into(),
                value: Expr::var("n").add(Expr::int(1)),
            },
            Stmt::PathGoal,
        ]);
        let set = build_program(&program, "main").expect("build");
        let cfg = set.entry_cfg();
        assert!(cfg.start_block.is_some());
        assert!(cfg.goal_block.is_some());
        assert_ne!(cfg.start_block, cfg.goal_block);
    }

    #[test]
    fn missing_goal_marker_is_an_error() {
        let program = entry_fn(vec![Stmt::PathStart]);
        assert_eq!(
            build_program(&program, "main"),
            Err(MalformedFunctionError::MissingGoal("main".into()))
        );
    }

    #[test]
    fn missing_start_marker_is_an_error() {
        let program = entry_fn(vec![Stmt::PathGoal]);
        assert_eq!(
            build_program(&program, "main"),
            Err(MalformedFunctionError::MissingStart("main".into()))
        );
    }

    #[test]
    fn duplicate_markers_are_rejected() {
        let program = entry_fn(vec![Stmt::PathStart, Stmt::PathStart, Stmt::PathGoal]);
        assert_eq!(
            build_program(&program, "main"),
            Err(MalformedFunctionError::DuplicateStart("main".into()))
        );
    }

    #[test]
    fn goal_after_unconditional_return_is_unreachable() {
        let program = entry_fn(vec![Stmt::PathStart, Stmt::Return(None), Stmt::PathGoal]);
        assert_eq!(
            build_program(&program, "main"),
            Err(MalformedFunctionError::UnreachableGoal("main".into()))
        );
    }

    #[test]
    fn marker_in_callee_is_rejected() {
        let program = Program::new()
            .with_function(Function::new(
                "helper",
                vec![],
                vec![Stmt::PathGoal],
            ))
            .with_function(Function::new(
                "main",
                vec![],
                vec![Stmt::PathStart, Stmt::PathGoal],
            ));
        assert_eq!(
            build_program(&program, "main"),
            Err(MalformedFunctionError::MarkerOutsideEntry("helper".into()))
        );
    }

    #[test]
    fn conditionals_split_blocks_at_the_branch() {
        let program = entry_fn(vec![
            Stmt::PathStart,
            Stmt::If {
                cond: Expr::var("n").gt(Expr::int(2)),
                then_body: vec![Stmt::Update {
                    name: "n".into(),
                    op: UpdateOp::Inc,
                }],
                else_body: vec![],
            },
            Stmt::PathGoal,
        ]);
        let set = build_program(&program, "main").expect("build");
        let cfg = set.entry_cfg();
        let branches = cfg
            .blocks
            .iter()
            .filter(|b| matches!(b.terminator, Terminator::Branch { .. }))
            .count();
        assert_eq!(branches, 1);
    }

    #[test]
    fn nested_calls_flatten_to_chained_call_edges() {
        let program = Program::new()
            .with_function(Function::new("g", vec![Param::int("x")], vec![]))
            .with_function(Function::new("f", vec![Param::int("x")], vec![]))
            .with_function(Function::new(
                "main",
                vec![Param::int("n")],
                vec![
                    Stmt::PathStart,
                    Stmt::Assign {
                        name: "n".into(),
                        value: Expr::call("f", vec![Expr::call("g", vec![Expr::var("n")])])
                            .add(Expr::int(1)),
                    },
                    Stmt::PathGoal,
                ],
            ));
        let set = build_program(&program, "main").expect("build");
        let cfg = set.entry_cfg();
        let callees: Vec<&str> = cfg
            .blocks
            .iter()
            .filter_map(|b| match &b.terminator {
                Terminator::Call { callee, .. } => Some(callee.as_str()),
                _ => None,
            })
            .collect();
        // Inner call is hoisted first, its temp feeds the outer call.
        assert_eq!(callees, vec!["g", "f"]);
    }

    #[test]
    fn unknown_entry_is_rejected() {
        let program = entry_fn(vec![Stmt::PathStart, Stmt::PathGoal]);
        assert_eq!(
            build_program(&program, "nope"),
            Err(MalformedFunctionError::UnknownEntry("nope".into()))
        );
    }
}
