//! Abstract Syntax Tree (AST) for devcmd files
//!
//! The parser is the sole producer of these nodes; once returned they are
//! immutable. `display` renders nodes back to canonical source.

pub mod display;
pub mod types;

pub use types::*;
