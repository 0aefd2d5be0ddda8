use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use pathgen_ast::{BinOp, Expr, Function, ParamType, Program, Stmt, UnOp, UpdateOp};

use crate::result::Witness;

/// Execution faults the interpreter can hit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),
    #[error("arity mismatch calling '{0}'")]
    ArityMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("use of a value-less return from '{0}'")]
    MissingReturnValue(String),
    #[error("step budget exhausted")]
    StepBudgetExhausted,
    #[error("arithmetic overflow")]
    Overflow,
}

/// Outcome of one concrete run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Execution passed through the goal marker.
    GoalReached,
    /// The function finished without touching the goal marker.
    Completed,
}

/// Execute `entry` under `witness`, reporting whether the goal marker
/// is hit.
///
/// This is the in-repo stand-in for the external execution harness:
/// free inputs (unbound reads, havocs, volatile reads) draw their
/// values from the witness using the same symbol-naming discipline the
/// symbolic tracker uses, so a feasible witness replays the exact path
/// it was solved for.
pub fn execute(
    program: &Program,
    entry: &str,
    witness: &Witness,
    max_steps: u64,
) -> Result<ExecOutcome, ExecError> {
    let function = program
        .get(entry)
        .ok_or_else(|| ExecError::UnknownFunction(entry.to_string()))?;
    let mut interp = Interp {
        program,
        witness,
        steps_left: max_steps,
        fresh_counts: IndexMap::new(),
    };
    match interp.run_function(function, None)? {
        Flow::Goal => Ok(ExecOutcome::GoalReached),
        Flow::Normal | Flow::Returned(_) => Ok(ExecOutcome::Completed),
    }
}

enum Flow {
    Normal,
    Returned(Option<i64>),
    Goal,
}

struct Interp<'a> {
    program: &'a Program,
    witness: &'a Witness,
    steps_left: u64,
    fresh_counts: IndexMap<String, usize>,
}

struct Scope {
    env: IndexMap<String, i64>,
    volatile: HashSet<String>,
}

impl Interp<'_> {
    fn tick(&mut self) -> Result<(), ExecError> {
        if self.steps_left == 0 {
            return Err(ExecError::StepBudgetExhausted);
        }
        self.steps_left -= 1;
        Ok(())
    }

    /// Next input value for `base`, mirroring the symbolic tracker's
    /// fresh-symbol naming. Inputs absent from the witness default to
    /// zero (they were unconstrained).
    fn fresh_input(&mut self, base: &str) -> i64 {
        let count = self.fresh_counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            base.to_string()
        } else {
            format!("{base}!{count}")
        };
        self.witness.get(&name).unwrap_or(0)
    }

    fn run_function(
        &mut self,
        function: &Function,
        args: Option<Vec<i64>>,
    ) -> Result<Flow, ExecError> {
        let mut scope = Scope {
            env: IndexMap::new(),
            volatile: function
                .params
                .iter()
                .filter(|p| p.ty == ParamType::VolatileInt)
                .map(|p| p.name.clone())
                .collect(),
        };
        if let Some(args) = args {
            if args.len() != function.params.len() {
                return Err(ExecError::ArityMismatch(function.name.clone()));
            }
            for (param, value) in function.params.iter().zip(args) {
                scope.env.insert(param.name.clone(), value);
            }
        }
        self.run_block(&mut scope, &function.body)
    }

    fn run_block(&mut self, scope: &mut Scope, stmts: &[Stmt]) -> Result<Flow, ExecError> {
        for stmt in stmts {
            match self.run_stmt(scope, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn run_stmt(&mut self, scope: &mut Scope, stmt: &Stmt) -> Result<Flow, ExecError> {
        self.tick()?;
        match stmt {
            Stmt::Decl { name, init } => {
                if let Some(init) = init {
                    let value = self.eval(scope, init)?;
                    scope.env.insert(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Havoc { name } => {
                let value = self.fresh_input(name);
                scope.env.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(scope, value)?;
                scope.env.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Update { name, op } => {
                let old = self.read_var(scope, name);
                let new = match op {
                    UpdateOp::Inc => old.checked_add(1),
                    UpdateOp::Dec => old.checked_sub(1),
                }
                .ok_or(ExecError::Overflow)?;
                scope.env.insert(name.clone(), new);
                Ok(Flow::Normal)
            }
            Stmt::CompoundAssign { name, op, value } => {
                let old = self.read_var(scope, name);
                let rhs = self.eval(scope, value)?;
                let new = self.apply_int_op(*op, old, rhs)?;
                scope.env.insert(name.clone(), new);
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(scope, cond)? != 0 {
                    self.run_block(scope, then_body)
                } else {
                    self.run_block(scope, else_body)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(scope, cond)? != 0 {
                    self.tick()?;
                    match self.run_block(scope, body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => Some(self.eval(scope, expr)?),
                    None => None,
                };
                Ok(Flow::Returned(value))
            }
            Stmt::Expr(expr) => {
                self.eval(scope, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::PathStart => Ok(Flow::Normal),
            Stmt::PathGoal => Ok(Flow::Goal),
        }
    }

    fn read_var(&mut self, scope: &mut Scope, name: &str) -> i64 {
        if scope.volatile.contains(name) {
            return self.fresh_input(name);
        }
        if let Some(value) = scope.env.get(name) {
            return *value;
        }
        let value = self.fresh_input(name);
        scope.env.insert(name.to_string(), value);
        value
    }

    fn apply_int_op(&self, op: BinOp, l: i64, r: i64) -> Result<i64, ExecError> {
        match op {
            BinOp::Add => l.checked_add(r).ok_or(ExecError::Overflow),
            BinOp::Sub => l.checked_sub(r).ok_or(ExecError::Overflow),
            BinOp::Mul => l.checked_mul(r).ok_or(ExecError::Overflow),
            BinOp::Div => {
                if r == 0 {
                    Err(ExecError::DivisionByZero)
                } else {
                    l.checked_div(r).ok_or(ExecError::Overflow)
                }
            }
            BinOp::Rem => {
                if r == 0 {
                    Err(ExecError::DivisionByZero)
                } else {
                    l.checked_rem(r).ok_or(ExecError::Overflow)
                }
            }
            BinOp::Eq => Ok((l == r) as i64),
            BinOp::Ne => Ok((l != r) as i64),
            BinOp::Lt => Ok((l < r) as i64),
            BinOp::Le => Ok((l <= r) as i64),
            BinOp::Gt => Ok((l > r) as i64),
            BinOp::Ge => Ok((l >= r) as i64),
            BinOp::And => Ok((l != 0 && r != 0) as i64),
            BinOp::Or => Ok((l != 0 || r != 0) as i64),
        }
    }

    fn eval(&mut self, scope: &mut Scope, expr: &Expr) -> Result<i64, ExecError> {
        match expr {
            Expr::Int(n) => Ok(*n),
            Expr::Var(name) => Ok(self.read_var(scope, name)),
            Expr::Unary(UnOp::Neg, inner) => {
                let v = self.eval(scope, inner)?;
                v.checked_neg().ok_or(ExecError::Overflow)
            }
            Expr::Unary(UnOp::Not, inner) => {
                let v = self.eval(scope, inner)?;
                Ok((v == 0) as i64)
            }
            Expr::Binary(op, lhs, rhs) => {
                // Both operands evaluate (no short-circuit), matching
                // the symbolic tracker's treatment of predicates.
                let l = self.eval(scope, lhs)?;
                let r = self.eval(scope, rhs)?;
                self.apply_int_op(*op, l, r)
            }
            Expr::Call(name, args) => {
                let function = self
                    .program
                    .get(name)
                    .ok_or_else(|| ExecError::UnknownFunction(name.clone()))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(scope, arg)?);
                }
                match self.run_function(function, Some(values))? {
                    Flow::Returned(Some(value)) => Ok(value),
                    Flow::Returned(None) | Flow::Normal => {
                        Err(ExecError::MissingReturnValue(name.clone()))
                    }
                    Flow::Goal => {
                        // Markers never occur in callees (the builder
                        // rejects them), but stay conservative.
                        Err(ExecError::MissingReturnValue(name.clone()))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathgen_ast::Param;

    fn witness(pairs: &[(&str, i64)]) -> Witness {
        let mut values = IndexMap::new();
        for (name, v) in pairs {
            values.insert(name.to_string(), *v);
        }
        Witness { values }
    }

    fn nested_branch_program() -> Program {
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
    fn goal_after_branches_is_reached_for_any_input() {
        let program = nested_branch_program();
        for n in [-5, 0, 3, 50] {
            let outcome =
                execute(&program, "main", &witness(&[("n", n)]), 10_000).expect("run");
            assert_eq!(outcome, ExecOutcome::GoalReached);
        }
    }

    #[test]
    fn guarded_goal_requires_the_right_input() {
        let program = Program::new().with_function(Function::new(
            "main",
            vec![Param::int("n")],
            vec![
                Stmt::PathStart,
                Stmt::If {
                    cond: Expr::var("n").eq(Expr::int(5)),
                    then_body: vec![Stmt::PathGoal],
                    else_body: vec![],
                },
            ],
        ));
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 5)]), 10_000).expect("run"),
            ExecOutcome::GoalReached
        );
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 4)]), 10_000).expect("run"),
            ExecOutcome::Completed
        );
    }

    #[test]
    fn calls_return_values_through_the_chain() {
        // func2(n) = n even ? n+2 : n+3; func1 = func2+1; func0 = func1
        let program = Program::new()
            .with_function(Function::new(
                "func2",
                vec![Param::int("n")],
                vec![
                    Stmt::If {
                        cond: Expr::var("n").rem(Expr::int(2)).eq(Expr::int(0)),
                        then_body: vec![Stmt::Return(Some(Expr::var("n").add(Expr::int(2))))],
                        else_body: vec![],
                    },
                    Stmt::Return(Some(Expr::var("n").add(Expr::int(3)))),
                ],
            ))
            .with_function(Function::new(
                "func1",
                vec![Param::int("n")],
                vec![Stmt::Return(Some(
                    Expr::call("func2", vec![Expr::var("n")]).add(Expr::int(1)),
                ))],
            ))
            .with_function(Function::new(
                "main",
                vec![],
                vec![
                    Stmt::Havoc { name: "n".into() },
                    Stmt::PathStart,
                    Stmt::Assign {
                        name: "n".into(),
                        value: Expr::call("func1", vec![Expr::var("n")]),
                    },
                    Stmt::If {
                        cond: Expr::var("n").eq(Expr::int(5)),
                        then_body: vec![Stmt::PathGoal],
                        else_body: vec![],
                    },
                ],
            ));
        // even: n=2 -> 2+2+1 = 5
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 2)]), 10_000).expect("run"),
            ExecOutcome::GoalReached
        );
        // odd: n=1 -> 1+3+1 = 5
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 1)]), 10_000).expect("run"),
            ExecOutcome::GoalReached
        );
        // n=3 -> 3+3+1 = 7, misses the goal
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 3)]), 10_000).expect("run"),
            ExecOutcome::Completed
        );
    }

    #[test]
    fn volatile_reads_consume_numbered_witness_entries() {
        let program = Program::new().with_function(Function::new(
            "main",
            vec![Param::volatile_int("n")],
            vec![
                Stmt::PathStart,
                Stmt::If {
                    cond: Expr::var("n").gt(Expr::int(2)),
                    then_body: vec![Stmt::If {
                        cond: Expr::var("n").lt(Expr::int(10)),
                        then_body: vec![Stmt::PathGoal],
                        else_body: vec![],
                    }],
                    else_body: vec![],
                },
            ],
        ));
        // First read 5 (> 2), second read 7 (< 10): goal reached.
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 5), ("n!2", 7)]), 10_000).expect("run"),
            ExecOutcome::GoalReached
        );
        // Second read jumps to 50: inner branch misses.
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 5), ("n!2", 50)]), 10_000).expect("run"),
            ExecOutcome::Completed
        );
    }

    #[test]
    fn runaway_loops_hit_the_step_budget() {
        let program = Program::new().with_function(Function::new(
            "main",
            vec![],
            vec![
                Stmt::PathStart,
                Stmt::While {
                    cond: Expr::int(1),
                    body: vec![],
                },
                Stmt::PathGoal,
            ],
        ));
        assert_eq!(
            execute(&program, "main", &witness(&[]), 1_000),
            Err(ExecError::StepBudgetExhausted)
        );
    }

    #[test]
    fn division_by_zero_is_reported() {
        let program = Program::new().with_function(Function::new(
            "main",
            vec![Param::int("n")],
            vec![
                Stmt::PathStart,
                Stmt::Assign {
                    name: "n".into(),
                    value: Expr::var("n").div(Expr::int(0)),
                },
                Stmt::PathGoal,
            ],
        ));
        assert_eq!(
            execute(&program, "main", &witness(&[("n", 1)]), 1_000),
            Err(ExecError::DivisionByZero)
        );
    }
}
