use indexmap::IndexMap;
use serde::Serialize;

/// Semantic type of a function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamType {
    /// Plain machine integer.
    Int,
    /// Volatile-qualified integer: its value may change between reads,
    /// so every read observes a fresh unknown.
    VolatileInt,
}

/// A named, typed function parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
}

impl Param {
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ParamType::Int,
        }
    }

    pub fn volatile_int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ParamType::VolatileInt,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Truncated division (C semantics).
    Div,
    /// Truncated remainder (C semantics).
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression tree.
///
/// Calls may appear anywhere inside an expression; the CFG builder
/// flattens them out into dedicated call edges before analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Integer literal.
    Int(i64),
    /// Variable reference by name.
    Var(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Call of a named function with argument expressions.
    Call(String, Vec<Expr>),
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Int(n)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(name.into(), args)
    }

    pub fn neg(self) -> Self {
        Expr::Unary(UnOp::Neg, Box::new(self))
    }

    pub fn not(self) -> Self {
        Expr::Unary(UnOp::Not, Box::new(self))
    }

    pub fn add(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Add, Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Sub, Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Mul, Box::new(self), Box::new(other))
    }

    pub fn div(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Div, Box::new(self), Box::new(other))
    }

    pub fn rem(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Rem, Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Eq, Box::new(self), Box::new(other))
    }

    pub fn ne(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Ne, Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Lt, Box::new(self), Box::new(other))
    }

    pub fn le(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Le, Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Gt, Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Ge, Box::new(self), Box::new(other))
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::Binary(BinOp::And, Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Binary(BinOp::Or, Box::new(self), Box::new(other))
    }
}

/// Statement-position increment/decrement (`n++;` / `n--;`).
///
/// Pre and post forms are indistinguishable in statement position, so a
/// single variant covers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateOp {
    Inc,
    Dec,
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// Local declaration with an optional initializer.
    Decl { name: String, init: Option<Expr> },
    /// Bind a fresh unconstrained input value to `name`.
    ///
    /// Front-ends lower randomized-input placeholders to this form, so
    /// free inputs are explicit in the representation rather than
    /// ambient global state.
    Havoc { name: String },
    Assign { name: String, value: Expr },
    /// `name++;` / `name--;` as read-then-write.
    Update { name: String, op: UpdateOp },
    /// `name op= value;` as read-then-write.
    CompoundAssign {
        name: String,
        op: BinOp,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
    /// Expression evaluated for effect (e.g. a bare call).
    Expr(Expr),
    /// The `path_start()` marker.
    PathStart,
    /// The `path_goal()` marker.
    PathGoal,
}

/// A single function: ordered statements plus typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<Param>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }
}

/// A set of functions, keyed by name so calls can be resolved for
/// inlining. Insertion order is preserved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub functions: IndexMap<String, Function>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one with the same name.
    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.add_function(function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }
}
