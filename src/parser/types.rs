//! Parser Types and Constants
//!
//! Shared error types and parse limits used across the lexer and
//! parser modules.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_TOKENS: usize = 100_000; // Max tokens to parse
pub const MAX_PARSE_ITERATIONS: usize = 1_000_000; // Max iterations in parsing loops
pub const MAX_PARSER_DEPTH: usize = 200; // Max recursion depth for nested constructs

/// Classification of a parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum ParseErrorKind {
    // Lexical
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("invalid escape")]
    InvalidEscape,
    #[error("illegal character")]
    IllegalCharacter,

    // Syntactic
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unclosed brace")]
    UnclosedBrace,
    #[error("unclosed parenthesis")]
    UnclosedParen,
    #[error("invalid variable value")]
    InvalidVariableValue,
    #[error("empty pattern branch")]
    EmptyBranch,

    // Schema
    #[error("unknown decorator")]
    UnknownDecorator,
    #[error("wrong decorator kind")]
    WrongDecoratorKind,
    #[error("unknown parameter")]
    UnknownParameter,
    #[error("duplicate parameter")]
    DuplicateParameter,
    #[error("missing required parameter")]
    MissingParameter,
    #[error("too many arguments")]
    TooManyArguments,
    #[error("parameter type mismatch")]
    ParameterTypeMismatch,
    #[error("unknown pattern branch")]
    UnknownPattern,
    #[error("disallowed pattern branch")]
    DisallowedPattern,
    #[error("duplicate pattern branch")]
    DuplicatePattern,
    #[error("missing required pattern branch")]
    MissingPattern,

    // Reference
    #[error("undefined variable")]
    UndefinedVariable,
    #[error("variable type mismatch")]
    VariableTypeMismatch,

    // Resource limits
    #[error("input limit exceeded")]
    LimitExceeded,
}

/// A structured parse error with source context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Byte range of the offending token
    pub start: usize,
    pub end: usize,
    /// Up to three source lines surrounding the error (prev, current, next)
    pub context_lines: Vec<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
            column,
            start: 0,
            end: 0,
            context_lines: Vec::new(),
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Attach a three-line excerpt (`prev | current | next`) taken from the
    /// source. `lines` is the full source split on newlines.
    pub fn with_context(mut self, lines: &[&str]) -> Self {
        if self.line == 0 || self.line > lines.len() {
            return self;
        }
        let idx = self.line - 1;
        let mut context = Vec::new();
        if idx > 0 {
            context.push(lines[idx - 1].to_string());
        }
        context.push(lines[idx].to_string());
        if idx + 1 < lines.len() {
            context.push(lines[idx + 1].to_string());
        }
        self.context_lines = context;
        self
    }

    /// Render the excerpt with a caret under the offending column.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Parse error at {}:{}: {}\n",
            self.line, self.column, self.message
        );
        if self.context_lines.is_empty() {
            return out;
        }
        let has_prev = self.context_lines.len() > 1 && self.line > 1;
        let first_line = if has_prev { self.line - 1 } else { self.line };
        let width = (first_line + self.context_lines.len()).to_string().len();
        for (i, text) in self.context_lines.iter().enumerate() {
            let lineno = first_line + i;
            out.push_str(&format!("{lineno:>width$} | {text}\n"));
            if lineno == self.line {
                let pad = " ".repeat(width + 3 + self.column.saturating_sub(1));
                out.push_str(&pad);
                out.push_str("^\n");
            }
        }
        out
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at {}:{}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}
