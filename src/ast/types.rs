//! Abstract Syntax Tree (AST) Types for Devcmd
//!
//! This module defines the complete AST structure for devcmd files.
//! The design follows the devcmd grammar while being Rust-idiomatic.
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → (execution / codegen / planning)

use lazy_static::lazy_static;
use regex_lite::Regex;
use serde::Serialize;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Position information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

/// Byte span in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Quote style of a string literal. Double quotes and backticks interpolate
/// `@name(...)` calls; single quotes are verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteStyle {
    Double,
    Single,
    Backtick,
}

impl QuoteStyle {
    pub fn quote_char(&self) -> char {
        match self {
            Self::Double => '"',
            Self::Single => '\'',
            Self::Backtick => '`',
        }
    }

    /// Whether `@name(...)` inside this string style is interpolated.
    pub fn interpolates(&self) -> bool {
        !matches!(self, Self::Single)
    }
}

// =============================================================================
// PROGRAM & DECLARATIONS
// =============================================================================

/// Root node: a complete devcmd file
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub variables: Vec<VarDecl>,
    pub var_groups: Vec<VarGroup>,
    pub commands: Vec<CommandDecl>,
}

/// A single variable declaration: `var NAME = literal`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub name: String,
    /// Restricted to the four literal kinds; the parser rejects identifiers.
    pub value: Expression,
    pub line: usize,
}

/// A grouped set of variable declarations: `var ( NAME = literal ... )`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarGroup {
    pub variables: Vec<VarDecl>,
    pub line: usize,
}

/// Declaration flavor of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandKind {
    Command,
    Watch,
    Stop,
}

/// A named command declaration: `[watch|stop] NAME: body`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDecl {
    pub kind: CommandKind,
    pub name: String,
    pub body: Vec<CommandContent>,
    pub line: usize,
}

// =============================================================================
// COMMAND CONTENT
// =============================================================================

/// One item of a command body. Bodies are lists of these; newlines always
/// separate items, so a multi-line body yields multiple entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CommandContent {
    /// A single shell line with no chaining operator
    Shell(ShellContent),
    /// An operator-chained shell line (`&&`, `||`, `|`, `>>`)
    Chain(ShellChain),
    /// `@name(args) { ... }`
    Block(BlockDecorator),
    /// `@name(args) { branch: ... }`
    Pattern(PatternDecorator),
    /// A standalone `@name(args)` statement
    Action(DecoratorCall),
}

/// One shell command line, flattened into parts in source order
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ShellContent {
    pub parts: Vec<ShellPart>,
}

/// A shell line containing at least one chaining operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellChain {
    pub elements: Vec<ChainElement>,
}

/// One run of a chain. `operator` is the operator *following* this run;
/// the trailing element always carries `ChainOperator::None`. When the
/// operator is `>>`, `target` holds the redirect target text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainElement {
    pub content: ShellContent,
    pub operator: ChainOperator,
    pub target: Option<String>,
}

/// Chaining operator between shell runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainOperator {
    /// No operator follows (trailing element)
    None,
    And,
    Or,
    Pipe,
    Append,
}

impl ChainOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::And => "&&",
            Self::Or => "||",
            Self::Pipe => "|",
            Self::Append => ">>",
        }
    }
}

/// `@name(args) { content }` wrapping a nested body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockDecorator {
    pub name: String,
    pub args: Vec<NamedArg>,
    pub content: Vec<CommandContent>,
}

/// `@name(args) { pattern: body ... }` dispatching across branches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternDecorator {
    pub name: String,
    pub args: Vec<NamedArg>,
    pub patterns: Vec<PatternBranch>,
}

/// One `pattern: body` clause of a pattern decorator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternBranch {
    pub pattern: BranchPattern,
    pub commands: Vec<CommandContent>,
}

/// Branch selector: a concrete name, or the `default` wildcard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BranchPattern {
    Identifier(String),
    Wildcard,
}

impl BranchPattern {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Identifier(name) => name,
            Self::Wildcard => "default",
        }
    }
}

// =============================================================================
// SHELL PARTS
// =============================================================================

/// A piece of one shell run, in source order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShellPart {
    /// Plain shell text
    Text(String),
    /// A quoted string literal, possibly with interpolated decorators
    StringLit(StringLit),
    /// Inline value decorator, e.g. `@var(NAME)`
    ValueDecorator(DecoratorCall),
    /// Inline action decorator
    ActionDecorator(DecoratorCall),
}

/// A quoted string inside shell text or a decorator argument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringLit {
    pub style: QuoteStyle,
    pub pieces: Vec<StringPiece>,
}

impl StringLit {
    /// Concatenated text of the pieces; `None` if any piece is a decorator.
    pub fn literal_text(&self) -> Option<String> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                StringPiece::Text(text) => out.push_str(text),
                StringPiece::Decorator(_) => return None,
            }
        }
        Some(out)
    }
}

/// One piece of an interpolated string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StringPiece {
    Text(String),
    Decorator(DecoratorCall),
}

/// An `@name(args)` call after argument binding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecoratorCall {
    pub name: String,
    pub args: Vec<NamedArg>,
}

/// A bound decorator argument. Positional arguments receive the schema
/// entry's name during binding, so the AST never exposes the positional
/// vs. named distinction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedArg {
    pub name: String,
    pub value: Expression,
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// Literal or identifier value used in variable declarations and
/// decorator arguments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    String(String),
    /// Raw numeric text, e.g. `-3` or `2.5`
    Number(String),
    /// Raw duration text, e.g. `30s` or `250ms`
    Duration(String),
    Boolean(bool),
    Identifier(String),
}

impl Expression {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Duration(_) => "duration",
            Self::Boolean(_) => "boolean",
            Self::Identifier(_) => "identifier",
        }
    }

    pub fn is_literal(&self) -> bool {
        !matches!(self, Self::Identifier(_))
    }
}

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m|h)$").unwrap();
}

/// Decompose a duration literal (`<number><unit>`, units `ms|s|m|h`) into
/// milliseconds. Returns `None` for anything that is not a valid duration.
pub fn parse_duration_ms(text: &str) -> Option<u64> {
    let caps = DURATION_RE.captures(text)?;
    let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit_ms: f64 = match caps.get(2)?.as_str() {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return None,
    };
    Some((amount * unit_ms) as u64)
}

// =============================================================================
// CONSTRUCTION HELPERS
// =============================================================================

impl ShellContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ShellPart::Text(text.into())],
        }
    }
}

impl CommandDecl {
    pub fn is_watch(&self) -> bool {
        self.kind == CommandKind::Watch
    }

    pub fn is_stop(&self) -> bool {
        self.kind == CommandKind::Stop
    }
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.var_groups.is_empty() && self.commands.is_empty()
    }

    /// All variable declarations, grouped and ungrouped, in source order.
    pub fn all_variables(&self) -> impl Iterator<Item = &VarDecl> {
        self.variables
            .iter()
            .chain(self.var_groups.iter().flat_map(|g| g.variables.iter()))
    }

    /// Look up a command declaration by name.
    pub fn command(&self, name: &str) -> Option<&CommandDecl> {
        self.commands.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_ms() {
        assert_eq!(parse_duration_ms("30s"), Some(30_000));
        assert_eq!(parse_duration_ms("250ms"), Some(250));
        assert_eq!(parse_duration_ms("2m"), Some(120_000));
        assert_eq!(parse_duration_ms("1h"), Some(3_600_000));
        assert_eq!(parse_duration_ms("1.5s"), Some(1_500));
    }

    #[test]
    fn test_parse_duration_rejects_non_durations() {
        assert_eq!(parse_duration_ms("30"), None);
        assert_eq!(parse_duration_ms("s"), None);
        assert_eq!(parse_duration_ms("30x"), None);
        assert_eq!(parse_duration_ms("-5s"), None);
        assert_eq!(parse_duration_ms("30 s"), None);
    }

    #[test]
    fn test_quote_style_interpolation() {
        assert!(QuoteStyle::Double.interpolates());
        assert!(QuoteStyle::Backtick.interpolates());
        assert!(!QuoteStyle::Single.interpolates());
    }

    #[test]
    fn test_expression_type_names() {
        assert_eq!(Expression::String("x".into()).type_name(), "string");
        assert_eq!(Expression::Duration("3s".into()).type_name(), "duration");
        assert!(Expression::Number("1".into()).is_literal());
        assert!(!Expression::Identifier("X".into()).is_literal());
    }

    #[test]
    fn test_chain_operator_strings() {
        assert_eq!(ChainOperator::And.as_str(), "&&");
        assert_eq!(ChainOperator::Append.as_str(), ">>");
        assert_eq!(ChainOperator::None.as_str(), "");
    }

    #[test]
    fn test_string_lit_literal_text() {
        let lit = StringLit {
            style: QuoteStyle::Double,
            pieces: vec![StringPiece::Text("a".into()), StringPiece::Text("b".into())],
        };
        assert_eq!(lit.literal_text(), Some("ab".into()));

        let interpolated = StringLit {
            style: QuoteStyle::Double,
            pieces: vec![StringPiece::Decorator(DecoratorCall {
                name: "var".into(),
                args: vec![],
            })],
        };
        assert_eq!(interpolated.literal_text(), None);
    }

    #[test]
    fn test_program_lookup_helpers() {
        let program = Program {
            variables: vec![VarDecl {
                name: "A".into(),
                value: Expression::Number("1".into()),
                line: 1,
            }],
            var_groups: vec![VarGroup {
                variables: vec![VarDecl {
                    name: "B".into(),
                    value: Expression::Boolean(true),
                    line: 2,
                }],
                line: 2,
            }],
            commands: vec![CommandDecl {
                kind: CommandKind::Command,
                name: "build".into(),
                body: vec![CommandContent::Shell(ShellContent::text("echo hi"))],
                line: 4,
            }],
        };
        assert_eq!(program.all_variables().count(), 2);
        assert!(program.command("build").is_some());
        assert!(program.command("missing").is_none());
        assert!(!program.is_empty());
    }
}
