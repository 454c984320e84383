//! devcmd - a declarative language for developer command files
//!
//! This library provides the devcmd front end: a mode-switching lexer and
//! a recursive-descent parser that validates decorators against a registry
//! and produces a typed, immutable AST. Execution, code generation, and
//! planning are left to consumers of the AST.

pub mod ast;
pub mod decorator;
pub mod parser;

pub use ast::types::*;
pub use decorator::{DecoratorDef, DecoratorKind, DecoratorRegistry, ParamSchema, ParamType, PatternSchema};
pub use parser::{parse, parse_with, ParseError, ParseErrorKind, Parser};
