use std::collections::BTreeSet;
use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use pathgen_ast::{BinOp, Expr, ParamType, Program, UnOp};
use pathgen_cfg::{CfgSet, Instr, Path, Terminator};
use pathgen_smt::backends::smtlib_printer::to_smtlib;
use pathgen_smt::sorts::SmtSort;
use pathgen_smt::terms::SmtTerm;

/// A statement or expression form that cannot be modelled symbolically.
///
/// Local to one path: the path is reported inconclusive while sibling
/// paths continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported construct: {construct}")]
pub struct UnsupportedConstructError {
    pub construct: String,
}

impl UnsupportedConstructError {
    fn new(construct: impl Into<String>) -> Self {
        Self {
            construct: construct.into(),
        }
    }
}

/// Conjunction of branch predicates accumulated along one path.
/// Immutable once the path has been fully replayed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathCondition {
    conjuncts: Vec<SmtTerm>,
}

impl PathCondition {
    pub fn from_conjuncts(conjuncts: Vec<SmtTerm>) -> Self {
        Self { conjuncts }
    }

    pub fn conjuncts(&self) -> &[SmtTerm] {
        &self.conjuncts
    }

    /// The whole condition as a single conjunction term.
    pub fn to_term(&self) -> SmtTerm {
        SmtTerm::and(self.conjuncts.clone())
    }

    /// SMT-LIB rendering of each conjunct, in accumulation order.
    pub fn render(&self) -> Vec<String> {
        self.conjuncts.iter().map(to_smtlib).collect()
    }

    /// Identity of the condition as a predicate set: equal keys mean
    /// the same conjuncts up to reordering and repetition.
    pub fn canonical_key(&self) -> String {
        let set: BTreeSet<String> = self.conjuncts.iter().map(to_smtlib).collect();
        set.into_iter().collect::<Vec<_>>().join(" & ")
    }
}

/// Result of replaying one path: its condition plus every input symbol
/// the replay materialized, in first-use order.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub condition: PathCondition,
    pub inputs: IndexMap<String, SmtSort>,
}

/// Replay `path` through the graphs, accumulating the path condition.
///
/// Reads of variables with no binding materialize fresh input symbols
/// (entry parameters and anything live before the start marker are
/// inputs by definition). Volatile-qualified parameters produce a fresh
/// symbol on every read, since their value may change between
/// observations.
pub fn replay_path(
    cfgs: &CfgSet,
    program: &Program,
    path: &Path,
) -> Result<ReplayOutcome, UnsupportedConstructError> {
    Replay::new(cfgs, program).run(path)
}

struct Frame {
    env: IndexMap<String, SmtTerm>,
    volatile: HashSet<String>,
    /// Caller variable that receives this frame's return value.
    dest: Option<String>,
}

struct Replay<'a> {
    cfgs: &'a CfgSet,
    program: &'a Program,
    frames: Vec<Frame>,
    conjuncts: Vec<SmtTerm>,
    inputs: IndexMap<String, SmtSort>,
    fresh_counts: IndexMap<String, usize>,
}

impl<'a> Replay<'a> {
    fn new(cfgs: &'a CfgSet, program: &'a Program) -> Self {
        Self {
            cfgs,
            program,
            frames: Vec::new(),
            conjuncts: Vec::new(),
            inputs: IndexMap::new(),
            fresh_counts: IndexMap::new(),
        }
    }

    fn volatile_params(&self, function: &str) -> HashSet<String> {
        self.program
            .get(function)
            .map(|f| {
                f.params
                    .iter()
                    .filter(|p| p.ty == ParamType::VolatileInt)
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Materialize a new input symbol derived from `base`: the base
    /// name itself on first use, `base!k` afterwards.
    fn fresh_input(&mut self, base: &str) -> SmtTerm {
        let count = self.fresh_counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            base.to_string()
        } else {
            format!("{base}!{count}")
        };
        self.inputs.insert(name.clone(), SmtSort::Int);
        SmtTerm::Var(name)
    }

    fn read_var(&mut self, name: &str) -> SmtTerm {
        let top = self.frames.len() - 1;
        if self.frames[top].volatile.contains(name) {
            return self.fresh_input(name);
        }
        if let Some(value) = self.frames[top].env.get(name) {
            return value.clone();
        }
        let symbol = self.fresh_input(name);
        self.frames[top].env.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn write_var(&mut self, name: &str, value: SmtTerm) {
        let top = self.frames.len() - 1;
        self.frames[top].env.insert(name.to_string(), value);
    }

    fn is_boolean(term: &SmtTerm) -> bool {
        matches!(
            term,
            SmtTerm::BoolLit(_)
                | SmtTerm::Eq(_, _)
                | SmtTerm::Lt(_, _)
                | SmtTerm::Le(_, _)
                | SmtTerm::Gt(_, _)
                | SmtTerm::Ge(_, _)
                | SmtTerm::And(_)
                | SmtTerm::Or(_)
                | SmtTerm::Not(_)
        )
    }

    /// Coerce into a predicate: integers compare against zero, C-style.
    fn as_bool(term: SmtTerm) -> SmtTerm {
        if Self::is_boolean(&term) {
            term
        } else {
            SmtTerm::Not(Box::new(term.eq(SmtTerm::int(0))))
        }
    }

    fn as_int(term: SmtTerm) -> Result<SmtTerm, UnsupportedConstructError> {
        if Self::is_boolean(&term) {
            Err(UnsupportedConstructError::new(
                "boolean value in integer context",
            ))
        } else {
            Ok(term)
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<SmtTerm, UnsupportedConstructError> {
        match expr {
            Expr::Int(n) => Ok(SmtTerm::IntLit(*n)),
            Expr::Var(name) => Ok(self.read_var(name)),
            Expr::Unary(UnOp::Neg, inner) => {
                let inner = Self::as_int(self.eval(inner)?)?;
                Ok(SmtTerm::int(0).sub(inner))
            }
            Expr::Unary(UnOp::Not, inner) => {
                let inner = Self::as_bool(self.eval(inner)?);
                Ok(inner.not())
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                match op {
                    BinOp::Add => Ok(Self::as_int(l)?.add(Self::as_int(r)?)),
                    BinOp::Sub => Ok(Self::as_int(l)?.sub(Self::as_int(r)?)),
                    BinOp::Mul => Ok(Self::as_int(l)?.mul(Self::as_int(r)?)),
                    BinOp::Div => Ok(Self::as_int(l)?.div(Self::as_int(r)?)),
                    BinOp::Rem => Ok(Self::as_int(l)?.rem(Self::as_int(r)?)),
                    BinOp::Eq => Ok(Self::as_int(l)?.eq(Self::as_int(r)?)),
                    BinOp::Ne => Ok(Self::as_int(l)?.eq(Self::as_int(r)?).not()),
                    BinOp::Lt => Ok(Self::as_int(l)?.lt(Self::as_int(r)?)),
                    BinOp::Le => Ok(Self::as_int(l)?.le(Self::as_int(r)?)),
                    BinOp::Gt => Ok(Self::as_int(l)?.gt(Self::as_int(r)?)),
                    BinOp::Ge => Ok(Self::as_int(l)?.ge(Self::as_int(r)?)),
                    BinOp::And => Ok(SmtTerm::and(vec![Self::as_bool(l), Self::as_bool(r)])),
                    BinOp::Or => Ok(SmtTerm::or(vec![Self::as_bool(l), Self::as_bool(r)])),
                }
            }
            Expr::Call(name, _) => Err(UnsupportedConstructError::new(format!(
                "call to '{name}' in expression position"
            ))),
        }
    }

    fn run(mut self, path: &Path) -> Result<ReplayOutcome, UnsupportedConstructError> {
        self.frames.push(Frame {
            env: IndexMap::new(),
            volatile: self.volatile_params(&self.cfgs.entry),
            dest: None,
        });

        for (i, step) in path.steps.iter().enumerate() {
            let cfg = self.cfgs.get(&step.function).ok_or_else(|| {
                UnsupportedConstructError::new(format!("unknown function '{}'", step.function))
            })?;
            let block = cfg.block(step.block).clone();

            for instr in &block.instrs {
                match instr {
                    Instr::Assign { name, value } => {
                        let value = Self::as_int(self.eval(value)?)?;
                        self.write_var(name, value);
                    }
                    Instr::Havoc { name } => {
                        let symbol = self.fresh_input(name);
                        self.write_var(name, symbol);
                    }
                }
            }

            let next = match path.steps.get(i + 1) {
                Some(next) => next,
                None => break, // goal block: its terminator is not taken
            };

            match &block.terminator {
                Terminator::Jump(_) => {}
                Terminator::Branch {
                    cond, then_blk, ..
                } => {
                    let predicate = Self::as_bool(self.eval(cond)?);
                    if next.frame == step.frame && next.block == *then_blk {
                        self.conjuncts.push(predicate);
                    } else {
                        self.conjuncts.push(predicate.not());
                    }
                }
                Terminator::Call {
                    callee,
                    args,
                    dest,
                    ..
                } => {
                    if next.frame == step.frame {
                        // The enumerator stepped over a call it could not
                        // inline.
                        return Err(UnsupportedConstructError::new(format!(
                            "call to unknown function '{callee}' with unknown effects"
                        )));
                    }
                    let callee_fn = self.program.get(callee).ok_or_else(|| {
                        UnsupportedConstructError::new(format!("unknown function '{callee}'"))
                    })?;
                    let mut arg_values = Vec::with_capacity(args.len());
                    for arg in args {
                        arg_values.push(Self::as_int(self.eval(arg)?)?);
                    }
                    if arg_values.len() != callee_fn.params.len() {
                        return Err(UnsupportedConstructError::new(format!(
                            "arity mismatch calling '{callee}'"
                        )));
                    }
                    let env: IndexMap<String, SmtTerm> = callee_fn
                        .params
                        .iter()
                        .map(|p| p.name.clone())
                        .zip(arg_values)
                        .collect();
                    self.frames.push(Frame {
                        env,
                        volatile: self.volatile_params(callee),
                        dest: dest.clone(),
                    });
                }
                Terminator::Return(value) => {
                    let value = match value {
                        Some(value) => Some(Self::as_int(self.eval(value)?)?),
                        None => None,
                    };
                    let popped = self
                        .frames
                        .pop()
                        .expect("replay call stack cannot underflow");
                    if self.frames.is_empty() {
                        return Err(UnsupportedConstructError::new(
                            "return from the root frame inside a path",
                        ));
                    }
                    if let Some(dest) = popped.dest {
                        match value {
                            Some(value) => self.write_var(&dest, value),
                            None => {
                                return Err(UnsupportedConstructError::new(
                                    "use of a value-less return",
                                ))
                            }
                        }
                    }
                }
                Terminator::Exit => {
                    return Err(UnsupportedConstructError::new(
                        "control past the function exit",
                    ))
                }
            }
        }

        Ok(ReplayOutcome {
            condition: PathCondition {
                conjuncts: self.conjuncts,
            },
            inputs: self.inputs,
        })
    }
}
