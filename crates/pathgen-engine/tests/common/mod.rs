#![allow(dead_code)]

use pathgen_ast::{Expr, Function, Param, Program, Stmt, UpdateOp};

/// `f(n): if (n > 2) { if (n < 10) n++; } goal`
pub fn nested_branch_program() -> Program {
    Program::new().with_function(Function::new(
        "func",
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

/// The same shape with a volatile parameter: every read of `n` is a
/// fresh observation.
pub fn volatile_nested_branch_program() -> Program {
    Program::new().with_function(Function::new(
        "func",
        vec![Param::volatile_int("n")],
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

/// Three-deep call chain:
/// `func2(n) = n % 2 == 0 ? n + 2 : n + 3`, `func1 = func2 + 1`,
/// `func0` forwards, and the goal is guarded by `result == 5`.
pub fn seq_call_three_program() -> Program {
    Program::new()
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
            "func0",
            vec![Param::int("n")],
            vec![Stmt::Return(Some(Expr::call("func1", vec![Expr::var("n")])))],
        ))
        .with_function(Function::new(
            "main",
            vec![],
            vec![
                Stmt::Havoc { name: "n".into() },
                Stmt::PathStart,
                Stmt::Assign {
                    name: "n".into(),
                    value: Expr::call("func0", vec![Expr::var("n")]),
                },
                Stmt::If {
                    cond: Expr::var("n").eq(Expr::int(5)),
                    then_body: vec![Stmt::PathGoal],
                    else_body: vec![],
                },
            ],
        ))
}

/// `start; i = 0; while (i < bound) i++; goal`
pub fn counted_loop_program(bound: i64) -> Program {
    Program::new().with_function(Function::new(
        "main",
        vec![],
        vec![
            Stmt::PathStart,
            Stmt::Decl {
                name: "i".into(),
                init: Some(Expr::int(0)),
            },
            Stmt::While {
                cond: Expr::var("i").lt(Expr::int(bound)),
                body: vec![Stmt::Update {
                    name: "i".into(),
                    op: UpdateOp::Inc,
                }],
            },
            Stmt::PathGoal,
        ],
    ))
}
