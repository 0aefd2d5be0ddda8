#![doc = include_str!("../README.md")]

pub mod backends;
pub mod solver;
pub mod sorts;
pub mod terms;
