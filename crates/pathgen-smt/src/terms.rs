use crate::solver::{Model, ModelValue};

/// Abstract constraint term, solver-agnostic.
///
/// Quantifier-free linear integer arithmetic plus truncated division
/// and remainder, which follow C semantics (`-7 / 2 == -3`,
/// `-7 % 2 == -1`) to match the source language of analyzed functions.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),
    Div(Box<SmtTerm>, Box<SmtTerm>),
    Rem(Box<SmtTerm>, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: SmtTerm) -> Self {
        SmtTerm::Mul(Box::new(self), Box::new(other))
    }

    pub fn div(self, other: SmtTerm) -> Self {
        SmtTerm::Div(Box::new(self), Box::new(other))
    }

    pub fn rem(self, other: SmtTerm) -> Self {
        SmtTerm::Rem(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    /// Evaluate as an integer under `model`. `None` when a variable is
    /// missing, a sort is wrong, or a division by zero occurs.
    pub fn eval_int(&self, model: &Model) -> Option<i64> {
        match self {
            SmtTerm::Var(name) => match model.values.get(name) {
                Some(ModelValue::Int(n)) => Some(*n),
                _ => None,
            },
            SmtTerm::IntLit(n) => Some(*n),
            SmtTerm::Add(a, b) => a.eval_int(model)?.checked_add(b.eval_int(model)?),
            SmtTerm::Sub(a, b) => a.eval_int(model)?.checked_sub(b.eval_int(model)?),
            SmtTerm::Mul(a, b) => a.eval_int(model)?.checked_mul(b.eval_int(model)?),
            SmtTerm::Div(a, b) => a.eval_int(model)?.checked_div(b.eval_int(model)?),
            SmtTerm::Rem(a, b) => a.eval_int(model)?.checked_rem(b.eval_int(model)?),
            _ => None,
        }
    }

    /// Evaluate as a boolean under `model`. `None` on the same failures
    /// as [`SmtTerm::eval_int`].
    pub fn eval_bool(&self, model: &Model) -> Option<bool> {
        match self {
            SmtTerm::Var(name) => match model.values.get(name) {
                Some(ModelValue::Bool(b)) => Some(*b),
                _ => None,
            },
            SmtTerm::BoolLit(b) => Some(*b),
            SmtTerm::Eq(a, b) => Some(a.eval_int(model)? == b.eval_int(model)?),
            SmtTerm::Lt(a, b) => Some(a.eval_int(model)? < b.eval_int(model)?),
            SmtTerm::Le(a, b) => Some(a.eval_int(model)? <= b.eval_int(model)?),
            SmtTerm::Gt(a, b) => Some(a.eval_int(model)? > b.eval_int(model)?),
            SmtTerm::Ge(a, b) => Some(a.eval_int(model)? >= b.eval_int(model)?),
            SmtTerm::And(terms) => {
                for t in terms {
                    if !t.eval_bool(model)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            SmtTerm::Or(terms) => {
                for t in terms {
                    if t.eval_bool(model)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
            SmtTerm::Not(inner) => Some(!inner.eval_bool(model)?),
            _ => None,
        }
    }

    /// Collect every variable name occurring in the term, in first-use
    /// order.
    pub fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            SmtTerm::Var(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => {}
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
                a.collect_vars(out);
                b.collect_vars(out);
            }
            SmtTerm::And(terms) | SmtTerm::Or(terms) => {
                for t in terms {
                    t.collect_vars(out);
                }
            }
            SmtTerm::Not(inner) => inner.collect_vars(out),
        }
    }
}
