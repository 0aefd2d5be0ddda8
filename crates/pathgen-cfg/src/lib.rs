#![doc = include_str!("../README.md")]

pub mod builder;
pub mod cfg;
pub mod enumerate;

pub use builder::{build_program, MalformedFunctionError};
pub use cfg::{BasicBlock, BlockId, Cfg, CfgSet, Instr, Terminator};
pub use enumerate::{EnumerationLimits, Path, PathEnumerator, PathStep};
