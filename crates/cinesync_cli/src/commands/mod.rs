//! CLI command implementations.

pub mod cursors;
pub mod document;
pub mod run;
