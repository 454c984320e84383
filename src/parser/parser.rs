//! Recursive Descent Parser for Devcmd Files
//!
//! The parser consumes the lexer's token stream and produces a typed AST,
//! validating decorators against the registry as it goes. Errors are
//! accumulated: after recording an error the parser synchronizes to the
//! next plausible statement boundary and continues, so one run reports
//! every independent error.
//!
//! Grammar (simplified):
//!   program   ::= (var_decl | var_group | cmd_decl)*
//!   var_decl  ::= "var" IDENT "=" literal
//!   var_group ::= "var" "(" (IDENT "=" literal)* ")"
//!   cmd_decl  ::= ("watch" | "stop")? IDENT ":" body
//!   body      ::= "{" content* "}" | decorator | shell_line

use std::collections::HashMap;

use crate::ast::types::{Expression, Program, VarDecl, VarGroup};
use crate::decorator::{DecoratorRegistry, ParamType};
use crate::parser::lexer::{Lexer, Token, TokenType};
use crate::parser::types::{
    ParseError, ParseErrorKind, MAX_INPUT_SIZE, MAX_PARSER_DEPTH, MAX_PARSE_ITERATIONS, MAX_TOKENS,
};

/// Parse using the process-wide decorator registry.
pub fn parse(input: &str) -> Result<Program, Vec<ParseError>> {
    let registry = crate::decorator::global();
    parse_with(input, &*registry)
}

/// Parse against an explicit registry (for embedders and tests).
pub fn parse_with(input: &str, registry: &DecoratorRegistry) -> Result<Program, Vec<ParseError>> {
    Parser::new(registry).parse(input)
}

/// A deferred identifier-argument check, resolved once all variable
/// declarations have been seen.
pub(crate) struct VarRef {
    pub(crate) variable: String,
    pub(crate) expected: ParamType,
    pub(crate) decorator: String,
    pub(crate) parameter: String,
    pub(crate) line: usize,
    pub(crate) column: usize,
}

/// Main parser struct
pub struct Parser<'r> {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) errors: Vec<ParseError>,
    pub(crate) registry: &'r DecoratorRegistry,
    pub(crate) variables: HashMap<String, ParamType>,
    pub(crate) var_refs: Vec<VarRef>,
    pub(crate) source_lines: Vec<String>,
    pub(crate) iterations: usize,
    pub(crate) depth: usize,
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r DecoratorRegistry) -> Self {
        Parser {
            tokens: Vec::new(),
            pos: 0,
            errors: Vec::new(),
            registry,
            variables: HashMap::new(),
            var_refs: Vec::new(),
            source_lines: Vec::new(),
            iterations: 0,
            depth: 0,
        }
    }

    /// Parse a devcmd source string. Returns the program only when no
    /// errors were recorded; otherwise every accumulated error.
    pub fn parse(&mut self, input: &str) -> Result<Program, Vec<ParseError>> {
        if input.len() > MAX_INPUT_SIZE {
            return Err(vec![ParseError::new(
                ParseErrorKind::LimitExceeded,
                format!(
                    "input too large: {} bytes exceeds limit of {}",
                    input.len(),
                    MAX_INPUT_SIZE
                ),
                1,
                1,
            )]);
        }

        self.source_lines = input.lines().map(str::to_string).collect();
        let (tokens, lex_errors) = Lexer::new(input).tokenize();
        self.tokens = tokens;
        for err in lex_errors {
            self.push_error(err);
        }

        if self.tokens.len() > MAX_TOKENS {
            return Err(vec![ParseError::new(
                ParseErrorKind::LimitExceeded,
                format!(
                    "too many tokens: {} exceeds limit of {}",
                    self.tokens.len(),
                    MAX_TOKENS
                ),
                1,
                1,
            )]);
        }

        let program = self.parse_program();
        self.resolve_var_refs();

        if self.errors.is_empty() {
            Ok(program)
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        loop {
            if !self.tick() {
                break;
            }
            self.skip_trivia();
            match self.current().token_type {
                TokenType::Eof => break,
                TokenType::Var => {
                    if self.peek(1).token_type == TokenType::LParen {
                        if let Some(group) = self.parse_var_group() {
                            program.var_groups.push(group);
                        }
                    } else if let Some(var) = self.parse_var_decl() {
                        program.variables.push(var);
                    }
                }
                TokenType::Watch | TokenType::Stop | TokenType::Identifier => {
                    if let Some(command) = self.parse_command_decl() {
                        program.commands.push(command);
                    }
                }
                TokenType::ShellEnd => {
                    self.advance();
                }
                TokenType::Illegal => {
                    let token = self.current().clone();
                    self.error_at(
                        ParseErrorKind::IllegalCharacter,
                        format!("unexpected characters '{}'", token.value),
                        &token,
                    );
                    self.advance();
                    self.synchronize();
                }
                _ => {
                    let token = self.current().clone();
                    self.error_at(
                        ParseErrorKind::UnexpectedToken,
                        format!(
                            "unexpected {} at top level; expected a variable or command declaration",
                            describe(&token)
                        ),
                        &token,
                    );
                    self.synchronize();
                }
            }
        }
        program
    }

    // ===========================================================================
    // VARIABLE DECLARATIONS
    // ===========================================================================

    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let line = self.current().line;
        self.advance(); // var
        let name = match self.expect(TokenType::Identifier, "expected variable name after 'var'") {
            Some(token) => token.value,
            None => {
                self.synchronize();
                return None;
            }
        };
        if self
            .expect(TokenType::Equals, "expected '=' after variable name")
            .is_none()
        {
            self.synchronize();
            return None;
        }
        let value = match self.parse_var_value(&name) {
            Some(value) => value,
            None => {
                self.synchronize();
                return None;
            }
        };
        self.variables.insert(name.clone(), literal_type(&value));
        Some(VarDecl { name, value, line })
    }

    fn parse_var_group(&mut self) -> Option<VarGroup> {
        let line = self.current().line;
        self.advance(); // var
        let open = self.current().clone();
        self.advance(); // (
        let mut variables = Vec::new();
        loop {
            if !self.tick() {
                return None;
            }
            self.skip_trivia();
            match self.current().token_type {
                TokenType::RParen => {
                    self.advance();
                    return Some(VarGroup { variables, line });
                }
                TokenType::Eof => {
                    self.error_at(
                        ParseErrorKind::UnclosedParen,
                        "unclosed '(' in variable group",
                        &open,
                    );
                    return Some(VarGroup { variables, line });
                }
                TokenType::Comma => {
                    self.advance();
                }
                TokenType::Identifier => {
                    let entry_line = self.current().line;
                    let name = self.advance().value;
                    if self
                        .expect(TokenType::Equals, "expected '=' after variable name")
                        .is_none()
                    {
                        self.recover_in_group();
                        continue;
                    }
                    if let Some(value) = self.parse_var_value(&name) {
                        self.variables.insert(name.clone(), literal_type(&value));
                        variables.push(VarDecl {
                            name,
                            value,
                            line: entry_line,
                        });
                    } else {
                        self.recover_in_group();
                    }
                }
                _ => {
                    let token = self.current().clone();
                    self.error_at(
                        ParseErrorKind::UnexpectedToken,
                        format!("unexpected {} in variable group", describe(&token)),
                        &token,
                    );
                    self.recover_in_group();
                }
            }
        }
    }

    /// Skip to the next plausible entry inside a `var ( ... )` group.
    fn recover_in_group(&mut self) {
        loop {
            match self.current().token_type {
                TokenType::Identifier | TokenType::RParen | TokenType::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// A variable value must be one of the four literal kinds.
    fn parse_var_value(&mut self, name: &str) -> Option<Expression> {
        let token = self.current().clone();
        match token.token_type {
            TokenType::Number => {
                self.advance();
                Some(Expression::Number(token.value))
            }
            TokenType::Duration => {
                self.advance();
                Some(Expression::Duration(token.value))
            }
            TokenType::Boolean => {
                self.advance();
                Some(Expression::Boolean(token.value == "true"))
            }
            TokenType::StringStart => {
                let lit = self.parse_string_lit(crate::parser::shell_parser::StringCtx::VarValue);
                lit.literal_text().map(Expression::String)
            }
            TokenType::Identifier => {
                self.error_at(
                    ParseErrorKind::InvalidVariableValue,
                    format!(
                        "value of variable '{}' must be a string, number, duration, or boolean literal; got identifier '{}'",
                        name, token.value
                    ),
                    &token,
                );
                self.advance();
                None
            }
            _ => {
                self.error_at(
                    ParseErrorKind::InvalidVariableValue,
                    format!(
                        "value of variable '{}' must be a string, number, duration, or boolean literal; got {}",
                        name,
                        describe(&token)
                    ),
                    &token,
                );
                None
            }
        }
    }

    // ===========================================================================
    // HELPER METHODS
    // ===========================================================================

    pub(crate) fn current(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    pub(crate) fn peek(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    /// Consume a token of the given type or record an error. Does not
    /// synchronize; callers decide how to recover.
    pub(crate) fn expect(&mut self, token_type: TokenType, message: &str) -> Option<Token> {
        if self.check(token_type) {
            Some(self.advance())
        } else {
            let token = self.current().clone();
            self.error_at(
                ParseErrorKind::UnexpectedToken,
                format!("{message}; got {}", describe(&token)),
                &token,
            );
            None
        }
    }

    pub(crate) fn skip_trivia(&mut self) {
        while matches!(
            self.current().token_type,
            TokenType::Comment | TokenType::MultilineComment
        ) {
            self.advance();
        }
    }

    /// Iteration guard; returns false once the parse has run away.
    pub(crate) fn tick(&mut self) -> bool {
        self.iterations += 1;
        if self.iterations > MAX_PARSE_ITERATIONS {
            if !self
                .errors
                .iter()
                .any(|e| e.kind == ParseErrorKind::LimitExceeded)
            {
                let token = self.current().clone();
                self.error_at(
                    ParseErrorKind::LimitExceeded,
                    "maximum parse iterations exceeded",
                    &token,
                );
            }
            return false;
        }
        true
    }

    /// Depth guard for nested bodies; returns false past the limit.
    pub(crate) fn enter(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            let token = self.current().clone();
            self.error_at(
                ParseErrorKind::LimitExceeded,
                "maximum nesting depth exceeded",
                &token,
            );
            return false;
        }
        true
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn error_at(&mut self, kind: ParseErrorKind, message: impl Into<String>, token: &Token) {
        let err = ParseError::new(kind, message, token.line, token.column)
            .with_span(token.start, token.end);
        self.push_error(err);
    }

    pub(crate) fn push_error(&mut self, err: ParseError) {
        let lines: Vec<&str> = self.source_lines.iter().map(String::as_str).collect();
        self.errors.push(err.with_context(&lines));
    }

    /// Advance to the next plausible statement boundary: a top-level
    /// keyword, `IDENT ':'`, an `@` that begins a registered block or
    /// pattern decorator, or a closing brace (consumed).
    pub(crate) fn synchronize(&mut self) {
        loop {
            match self.current().token_type {
                TokenType::Eof | TokenType::Var | TokenType::Watch | TokenType::Stop => return,
                TokenType::Identifier if self.peek(1).token_type == TokenType::Colon => return,
                TokenType::At => {
                    let name = self.peek(1);
                    if name.token_type == TokenType::Identifier
                        && (self.registry.is_block(&name.value)
                            || self.registry.is_pattern(&name.value))
                    {
                        return;
                    }
                    self.advance();
                }
                TokenType::RBrace => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ===========================================================================
    // DEFERRED VARIABLE CHECKS
    // ===========================================================================

    /// Record an identifier argument for end-of-parse validation.
    pub(crate) fn defer_var_check(
        &mut self,
        variable: &str,
        expected: ParamType,
        decorator: &str,
        parameter: &str,
        token: &Token,
    ) {
        self.var_refs.push(VarRef {
            variable: variable.to_string(),
            expected,
            decorator: decorator.to_string(),
            parameter: parameter.to_string(),
            line: token.line,
            column: token.column,
        });
    }

    fn resolve_var_refs(&mut self) {
        let refs = std::mem::take(&mut self.var_refs);
        for var_ref in refs {
            match self.variables.get(&var_ref.variable) {
                None => {
                    let err = ParseError::new(
                        ParseErrorKind::UndefinedVariable,
                        format!(
                            "variable '{}' used as parameter '{}' of @{} is not declared",
                            var_ref.variable, var_ref.parameter, var_ref.decorator
                        ),
                        var_ref.line,
                        var_ref.column,
                    );
                    self.push_error(err);
                }
                Some(actual) if *actual != var_ref.expected => {
                    let err = ParseError::new(
                        ParseErrorKind::VariableTypeMismatch,
                        format!(
                            "variable '{}' is {} but parameter '{}' of @{} expects {}",
                            var_ref.variable,
                            actual.as_str(),
                            var_ref.parameter,
                            var_ref.decorator,
                            var_ref.expected.as_str()
                        ),
                        var_ref.line,
                        var_ref.column,
                    );
                    self.push_error(err);
                }
                Some(_) => {}
            }
        }
    }
}

/// Human-readable description of a token for error messages.
pub(crate) fn describe(token: &Token) -> String {
    match token.token_type {
        TokenType::Eof => "end of input".to_string(),
        TokenType::Identifier => format!("identifier '{}'", token.value),
        TokenType::ShellText => format!("shell text '{}'", token.value.trim()),
        TokenType::Illegal => format!("'{}'", token.value),
        _ => format!("'{}'", token.token_type.as_str()),
    }
}

fn literal_type(value: &Expression) -> ParamType {
    match value {
        Expression::String(_) => ParamType::String,
        Expression::Number(_) => ParamType::Number,
        Expression::Duration(_) => ParamType::Duration,
        Expression::Boolean(_) => ParamType::Boolean,
        Expression::Identifier(_) => ParamType::Identifier,
    }
}
