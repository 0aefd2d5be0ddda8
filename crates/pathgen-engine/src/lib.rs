#![doc = include_str!("../README.md")]

pub mod adapter;
pub mod concrete;
pub mod pipeline;
pub mod result;
pub mod symbolic;

pub use adapter::{SolverAdapter, SolverChoice};
pub use pipeline::{analyze, AnalysisError, AnalysisOptions};
pub use result::{AnalysisReport, PathResult, PathVerdict, Witness};
pub use symbolic::UnsupportedConstructError;
