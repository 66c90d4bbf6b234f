//! CLI command implementations.

pub mod list;
pub mod matrix;
pub mod run;
