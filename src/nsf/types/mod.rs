//! Foundational data structures, error types, diagnostics and options.

pub mod diagnostics;
pub mod error;
pub mod models;
pub mod options;
