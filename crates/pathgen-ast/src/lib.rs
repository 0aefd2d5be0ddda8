#![doc = include_str!("../README.md")]

pub mod ast;

pub use ast::{BinOp, Expr, Function, Param, ParamType, Program, Stmt, UnOp, UpdateOp};
