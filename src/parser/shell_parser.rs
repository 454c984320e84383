//! Shell Content Parsing
//!
//! Builds `ShellContent` / `ShellChain` nodes from shell-mode tokens:
//! contiguous text runs, embedded string literals, and inline decorator
//! calls, flattened into parts in source order. A bounded forward scan
//! decides up front whether a line is an operator chain.

use crate::ast::types::{
    ChainElement, ChainOperator, CommandContent, QuoteStyle, ShellChain, ShellContent, ShellPart,
    StringLit, StringPiece,
};
use crate::parser::lexer::TokenType;
use crate::parser::parser::{describe, Parser};
use crate::parser::types::ParseErrorKind;

/// Where a string literal appears; decides which embedded decorators are
/// acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringCtx {
    /// Inside shell text: value decorators interpolate
    Shell,
    /// A decorator argument value: no decorators allowed
    Argument,
    /// A variable declaration value: no decorators allowed
    VarValue,
}

impl<'r> Parser<'r> {
    /// Parse one shell statement: a plain line, an operator chain, or a
    /// standalone action decorator. Consumes the trailing `ShellEnd`.
    pub(crate) fn parse_shell_statement(&mut self) -> Option<CommandContent> {
        let stmt_token = self.current().clone();
        if self.is_shell_chain() {
            return self.parse_shell_chain();
        }

        let content = self.parse_shell_run();
        if self.check(TokenType::ShellEnd) {
            self.advance();
        }

        if content.parts.len() == 1 {
            match &content.parts[0] {
                ShellPart::ActionDecorator(call) => {
                    return Some(CommandContent::Action(call.clone()));
                }
                ShellPart::ValueDecorator(call) if self.registry.is_value(&call.name) => {
                    self.error_at(
                        ParseErrorKind::WrongDecoratorKind,
                        format!(
                            "value decorator @{} can only be used inline within shell commands",
                            call.name
                        ),
                        &stmt_token,
                    );
                    return None;
                }
                _ => {}
            }
        }

        if content.parts.is_empty() {
            return None;
        }
        Some(CommandContent::Shell(content))
    }

    /// Forward scan to the end of the logical line: does any chaining
    /// operator appear? Read-only and side-effect-free.
    pub(crate) fn is_shell_chain(&self) -> bool {
        let mut offset = 0;
        loop {
            let token = self.peek(offset);
            match token.token_type {
                TokenType::ShellEnd
                | TokenType::RBrace
                | TokenType::LBrace
                | TokenType::Eof => return false,
                // A branch label ends the current run
                TokenType::Identifier
                    if self.peek(offset + 1).token_type == TokenType::Colon =>
                {
                    return false;
                }
                TokenType::Pipe | TokenType::And | TokenType::Or | TokenType::Append => {
                    return true;
                }
                _ => offset += 1,
            }
        }
    }

    /// Parse an operator-chained line into one element per run. Each
    /// element's operator is the one following it; the trailing element has
    /// none. A `>>` operator records the following run's text as its
    /// redirect target.
    fn parse_shell_chain(&mut self) -> Option<CommandContent> {
        let mut elements: Vec<ChainElement> = Vec::new();
        loop {
            if !self.tick() {
                break;
            }
            let content = self.parse_shell_run();
            let operator = match self.current().token_type {
                TokenType::Pipe => ChainOperator::Pipe,
                TokenType::And => ChainOperator::And,
                TokenType::Or => ChainOperator::Or,
                TokenType::Append => ChainOperator::Append,
                _ => {
                    elements.push(ChainElement {
                        content,
                        operator: ChainOperator::None,
                        target: None,
                    });
                    break;
                }
            };
            let op_token = self.advance();
            if content.parts.is_empty() {
                self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    format!("expected a command before '{}'", op_token.value),
                    &op_token,
                );
            }
            let target = if operator == ChainOperator::Append {
                match self.current().token_type {
                    TokenType::ShellText => Some(self.current().value.trim().to_string()),
                    _ => None,
                }
            } else {
                None
            };
            elements.push(ChainElement {
                content,
                operator,
                target,
            });
            if matches!(
                self.current().token_type,
                TokenType::ShellEnd | TokenType::RBrace | TokenType::Eof
            ) {
                self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    format!("expected a command after '{}'", op_token.value),
                    &op_token,
                );
                break;
            }
        }
        if self.check(TokenType::ShellEnd) {
            self.advance();
        }
        if elements.len() == 1 && elements[0].operator == ChainOperator::None {
            let element = elements.remove(0);
            return Some(CommandContent::Shell(element.content));
        }
        Some(CommandContent::Chain(ShellChain { elements }))
    }

    /// One run: contiguous text, strings, and inline decorators up to the
    /// next operator or line terminator.
    pub(crate) fn parse_shell_run(&mut self) -> ShellContent {
        let mut parts: Vec<ShellPart> = Vec::new();
        loop {
            if !self.tick() {
                break;
            }
            match self.current().token_type {
                TokenType::ShellText => {
                    let token = self.advance();
                    parts.push(ShellPart::Text(token.value));
                }
                TokenType::StringStart => {
                    let lit = self.parse_string_lit(StringCtx::Shell);
                    parts.push(ShellPart::StringLit(lit));
                }
                TokenType::At => {
                    if let Some(part) = self.parse_inline_decorator() {
                        parts.push(part);
                    }
                }
                TokenType::Comment | TokenType::MultilineComment => {
                    self.advance();
                }
                _ => break,
            }
        }
        // Trailing whitespace before a terminator is not content
        let drop_trailing =
            matches!(parts.last(), Some(ShellPart::Text(t)) if t.trim_end().is_empty());
        if drop_trailing {
            parts.pop();
        } else if let Some(ShellPart::Text(text)) = parts.last_mut() {
            if text.ends_with([' ', '\t']) {
                *text = text.trim_end().to_string();
            }
        }
        ShellContent { parts }
    }

    /// An `@name(...)` inside shell text: value and action decorators are
    /// parts; block and pattern decorators cannot appear inline.
    fn parse_inline_decorator(&mut self) -> Option<ShellPart> {
        let at_token = self.current().clone();
        let (name, args, _) = self.parse_decorator_header()?;
        if self.registry.is_block(&name) || self.registry.is_pattern(&name) {
            self.error_at(
                ParseErrorKind::WrongDecoratorKind,
                format!(
                    "@{} is a {} decorator and cannot appear inline in shell text",
                    name,
                    self.registry
                        .kind_of(&name)
                        .map(|k| k.as_str())
                        .unwrap_or("block"),
                ),
                &at_token,
            );
            self.skip_balanced_braces();
            return None;
        }
        let call = crate::ast::types::DecoratorCall { name, args };
        if self.registry.is_action(&call.name) {
            Some(ShellPart::ActionDecorator(call))
        } else {
            // Value decorators and unknown names (already reported)
            Some(ShellPart::ValueDecorator(call))
        }
    }

    /// After an inline block-decorator error, consume a `{ ... }` that
    /// follows so the rest of the body still parses.
    fn skip_balanced_braces(&mut self) {
        if !self.check(TokenType::LBrace) {
            return;
        }
        let mut depth = 0usize;
        loop {
            if !self.tick() {
                return;
            }
            match self.current().token_type {
                TokenType::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenType::RBrace => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                TokenType::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ===========================================================================
    // STRING LITERALS
    // ===========================================================================

    /// Assemble `StringStart .. StringEnd` tokens into a `StringLit`,
    /// parsing interpolated decorator calls where the context allows them.
    pub(crate) fn parse_string_lit(&mut self, ctx: StringCtx) -> StringLit {
        let start = self.advance(); // StringStart
        let style = match start.value.chars().next() {
            Some('\'') => QuoteStyle::Single,
            Some('`') => QuoteStyle::Backtick,
            _ => QuoteStyle::Double,
        };
        let mut pieces: Vec<StringPiece> = Vec::new();
        loop {
            if !self.tick() {
                break;
            }
            match self.current().token_type {
                TokenType::StringText => {
                    let token = self.advance();
                    pieces.push(StringPiece::Text(token.value));
                }
                TokenType::StringEnd => {
                    self.advance();
                    break;
                }
                TokenType::At => {
                    let at_token = self.current().clone();
                    let Some((name, args, _)) = self.parse_decorator_header() else {
                        continue;
                    };
                    match ctx {
                        StringCtx::Shell => {
                            if self.registry.exists(&name) && !self.registry.is_value(&name) {
                                self.error_at(
                                    ParseErrorKind::WrongDecoratorKind,
                                    format!(
                                        "only value decorators can be interpolated in strings; @{name} is a {} decorator",
                                        self.registry.kind_of(&name).map(|k| k.as_str()).unwrap_or("block"),
                                    ),
                                    &at_token,
                                );
                            }
                        }
                        StringCtx::Argument => {
                            self.error_at(
                                ParseErrorKind::WrongDecoratorKind,
                                "value decorators cannot be used inside decorator argument values",
                                &at_token,
                            );
                        }
                        StringCtx::VarValue => {
                            self.error_at(
                                ParseErrorKind::InvalidVariableValue,
                                "variable values cannot contain decorator interpolations",
                                &at_token,
                            );
                        }
                    }
                    pieces.push(StringPiece::Decorator(crate::ast::types::DecoratorCall {
                        name,
                        args,
                    }));
                }
                // Unterminated string: the lexer already recorded the error
                TokenType::Illegal => {
                    self.advance();
                    break;
                }
                TokenType::Eof => break,
                _ => {
                    let token = self.current().clone();
                    self.error_at(
                        ParseErrorKind::UnexpectedToken,
                        format!("unexpected {} inside string", describe(&token)),
                        &token,
                    );
                    self.advance();
                }
            }
        }
        StringLit { style, pieces }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::*;
    use crate::parser::parser::parse;

    fn body_of(input: &str) -> Vec<CommandContent> {
        let program = parse(input).expect("parse ok");
        program.commands[0].body.clone()
    }

    #[test]
    fn test_plain_shell_line() {
        let body = body_of("build: echo hello");
        assert_eq!(body, vec![CommandContent::Shell(ShellContent::text("echo hello"))]);
    }

    #[test]
    fn test_pipe_chain_three_elements() {
        let body = body_of("process: cat f | grep x | sort");
        let CommandContent::Chain(chain) = &body[0] else {
            panic!("expected chain, got {body:?}");
        };
        assert_eq!(chain.elements.len(), 3);
        let ops: Vec<ChainOperator> = chain.elements.iter().map(|e| e.operator).collect();
        assert_eq!(
            ops,
            vec![ChainOperator::Pipe, ChainOperator::Pipe, ChainOperator::None]
        );
        assert_eq!(chain.elements[0].content, ShellContent::text("cat f"));
        assert_eq!(chain.elements[2].content, ShellContent::text("sort"));
    }

    #[test]
    fn test_chain_well_formedness() {
        let body = body_of("go: a && b || c");
        let CommandContent::Chain(chain) = &body[0] else {
            panic!("expected chain");
        };
        let (last, init) = chain.elements.split_last().unwrap();
        assert_eq!(last.operator, ChainOperator::None);
        assert!(init.iter().all(|e| e.operator != ChainOperator::None));
        assert!(chain
            .elements
            .iter()
            .all(|e| e.target.is_none() || e.operator == ChainOperator::Append));
    }

    #[test]
    fn test_append_records_target() {
        let body = body_of("log: cat a >> out.txt");
        let CommandContent::Chain(chain) = &body[0] else {
            panic!("expected chain");
        };
        assert_eq!(chain.elements[0].operator, ChainOperator::Append);
        assert_eq!(chain.elements[0].target.as_deref(), Some("out.txt"));
        assert_eq!(chain.elements.last().unwrap().operator, ChainOperator::None);
    }

    #[test]
    fn test_no_chain_for_plain_line() {
        let body = body_of("serve: ./server --port 80");
        assert!(matches!(body[0], CommandContent::Shell(_)));
    }

    #[test]
    fn test_interpolated_string_parts() {
        let body = body_of("greet: echo \"Hello @var(NAME)!\"\nvar NAME = \"x\"");
        let CommandContent::Shell(shell) = &body[0] else {
            panic!("expected shell");
        };
        assert_eq!(shell.parts.len(), 2);
        assert_eq!(shell.parts[0], ShellPart::Text("echo ".into()));
        let ShellPart::StringLit(lit) = &shell.parts[1] else {
            panic!("expected string literal");
        };
        assert_eq!(lit.style, QuoteStyle::Double);
        assert_eq!(lit.pieces.len(), 3);
        assert_eq!(lit.pieces[0], StringPiece::Text("Hello ".into()));
        let StringPiece::Decorator(call) = &lit.pieces[1] else {
            panic!("expected decorator piece");
        };
        assert_eq!(call.name, "var");
        assert_eq!(call.args[0].value, Expression::Identifier("NAME".into()));
        assert_eq!(lit.pieces[2], StringPiece::Text("!".into()));
    }

    #[test]
    fn test_single_quoted_string_is_opaque() {
        let body = body_of("greet: echo 'Hello @var(NAME)!'");
        let CommandContent::Shell(shell) = &body[0] else {
            panic!("expected shell");
        };
        let ShellPart::StringLit(lit) = &shell.parts[1] else {
            panic!("expected string literal");
        };
        assert_eq!(lit.style, QuoteStyle::Single);
        assert_eq!(lit.pieces, vec![StringPiece::Text("Hello @var(NAME)!".into())]);
    }

    #[test]
    fn test_action_decorator_statement() {
        let body = body_of("release: @cmd(build)");
        let CommandContent::Action(call) = &body[0] else {
            panic!("expected action, got {body:?}");
        };
        assert_eq!(call.name, "cmd");
        assert_eq!(call.args[0].name, "name");
    }

    #[test]
    fn test_value_decorator_standalone_is_error() {
        let errors = parse("bad: @var(X)\nvar X = 1").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("inline within shell commands"));
    }

    #[test]
    fn test_inline_block_decorator_is_error() {
        let errors = parse("bad: echo a && @timeout(30s)").unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("cannot appear inline")));
    }

    #[test]
    fn test_email_stays_text() {
        let body = body_of("mail: send user@host.com");
        assert_eq!(
            body,
            vec![CommandContent::Shell(ShellContent::text("send user@host.com"))]
        );
    }

    #[test]
    fn test_multiple_lines_multiple_entries() {
        let body = body_of("all: {\n  echo a\n  echo b\n  echo c\n}");
        assert_eq!(body.len(), 3);
        assert!(body.iter().all(|c| matches!(c, CommandContent::Shell(_))));
    }

    #[test]
    fn test_value_decorator_between_text() {
        let body = body_of("serve: start --port @var(PORT) --host h\nvar PORT = 80");
        let CommandContent::Shell(shell) = &body[0] else {
            panic!("expected shell");
        };
        assert_eq!(shell.parts.len(), 3);
        assert!(matches!(&shell.parts[1], ShellPart::ValueDecorator(c) if c.name == "var"));
        assert_eq!(shell.parts[2], ShellPart::Text(" --host h".into()));
    }
}
