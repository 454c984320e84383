//! Decorator Parsing and Schema Validation
//!
//! Parses `@name(args)` headers, binds named and positional arguments
//! against the registry's parameter schema in one pass, and parses
//! block and pattern decorator bodies. The AST only ever sees bound
//! `NamedArg`s in canonical order.

use crate::ast::types::{
    BlockDecorator, BranchPattern, CommandContent, Expression, NamedArg, PatternBranch,
    PatternDecorator,
};
use crate::decorator::{ParamSchema, ParamType, PatternSchema};
use crate::parser::lexer::{Token, TokenType};
use crate::parser::parser::{describe, Parser};
use crate::parser::shell_parser::StringCtx;
use crate::parser::types::ParseErrorKind;

impl<'r> Parser<'r> {
    /// Parse `@name` plus an optional `(args)` list and validate against
    /// the registry schema. Returns the name, bound arguments, and the name
    /// token for error positioning.
    pub(crate) fn parse_decorator_header(&mut self) -> Option<(String, Vec<NamedArg>, Token)> {
        self.advance(); // @
        let name_token = match self.current().token_type {
            TokenType::Identifier => self.advance(),
            _ => {
                let token = self.current().clone();
                self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    format!("expected decorator name after '@'; got {}", describe(&token)),
                    &token,
                );
                return None;
            }
        };
        let name = name_token.value.clone();
        let known = self.registry.exists(&name);
        if !known {
            self.error_at(
                ParseErrorKind::UnknownDecorator,
                format!("unknown decorator '@{name}'"),
                &name_token,
            );
        }

        let args = if self.check(TokenType::LParen) {
            self.parse_arg_list(&name, known)
        } else {
            Vec::new()
        };

        // Required parameters apply to the no-paren form as well
        if known {
            let schema: Vec<ParamSchema> = self
                .registry
                .param_schema(&name)
                .map(<[ParamSchema]>::to_vec)
                .unwrap_or_default();
            for param in &schema {
                if param.required && !args.iter().any(|a| a.name == param.name) {
                    self.error_at(
                        ParseErrorKind::MissingParameter,
                        format!("missing required parameter '{}' of @{name}", param.name),
                        &name_token,
                    );
                }
            }
        }
        Some((name, args, name_token))
    }

    /// Parse `(arg, arg, ...)`, binding each argument to the schema in one
    /// pass. Named arguments bind by name; positionals bind to schema
    /// entries in order, falling back to synthesized `argN` names past the
    /// end of the schema.
    fn parse_arg_list(&mut self, decorator: &str, known: bool) -> Vec<NamedArg> {
        let open = self.advance(); // (
        let schema: Vec<ParamSchema> = self
            .registry
            .param_schema(decorator)
            .map(<[ParamSchema]>::to_vec)
            .unwrap_or_default();
        let mut bound: Vec<NamedArg> = Vec::new();
        let mut positional_index = 0usize;
        loop {
            if !self.tick() {
                break;
            }
            self.skip_trivia();
            match self.current().token_type {
                TokenType::RParen => {
                    self.advance();
                    break;
                }
                TokenType::Eof => {
                    self.error_at(
                        ParseErrorKind::UnclosedParen,
                        format!("unclosed '(' in @{decorator} arguments"),
                        &open,
                    );
                    break;
                }
                TokenType::Comma => {
                    self.advance();
                }
                TokenType::Identifier if self.peek(1).token_type == TokenType::Equals => {
                    let name_token = self.advance();
                    self.advance(); // =
                    let arg_name = name_token.value.clone();
                    let entry = schema.iter().find(|p| p.name == arg_name);
                    if known && entry.is_none() {
                        self.error_at(
                            ParseErrorKind::UnknownParameter,
                            format!("unknown parameter '{arg_name}' of @{decorator}"),
                            &name_token,
                        );
                    }
                    if bound.iter().any(|a| a.name == arg_name) {
                        self.error_at(
                            ParseErrorKind::DuplicateParameter,
                            format!("parameter '{arg_name}' of @{decorator} given more than once"),
                            &name_token,
                        );
                    }
                    if let Some(value) = self.parse_arg_value(decorator, &arg_name, entry) {
                        bound.push(NamedArg {
                            name: arg_name,
                            value,
                        });
                    } else {
                        self.recover_in_args();
                    }
                }
                _ => {
                    let entry = schema.get(positional_index);
                    let arg_name = entry
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| format!("arg{positional_index}"));
                    if known && entry.is_none() {
                        let token = self.current().clone();
                        self.error_at(
                            ParseErrorKind::TooManyArguments,
                            format!(
                                "@{decorator} takes {} argument(s); extra positional argument",
                                schema.len()
                            ),
                            &token,
                        );
                    }
                    if bound.iter().any(|a| a.name == arg_name) {
                        let token = self.current().clone();
                        self.error_at(
                            ParseErrorKind::DuplicateParameter,
                            format!("parameter '{arg_name}' of @{decorator} given more than once"),
                            &token,
                        );
                    }
                    positional_index += 1;
                    if let Some(value) = self.parse_arg_value(decorator, &arg_name, entry) {
                        bound.push(NamedArg {
                            name: arg_name,
                            value,
                        });
                    } else {
                        self.recover_in_args();
                    }
                }
            }
        }
        bound
    }

    /// Skip to the next argument boundary after a malformed value.
    fn recover_in_args(&mut self) {
        loop {
            match self.current().token_type {
                TokenType::Comma | TokenType::RParen | TokenType::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Parse one argument value, type-directed by the schema entry.
    /// Identifiers are accepted for any type and checked against the
    /// variable table once the whole file has been parsed.
    fn parse_arg_value(
        &mut self,
        decorator: &str,
        parameter: &str,
        entry: Option<&ParamSchema>,
    ) -> Option<Expression> {
        let token = self.current().clone();
        let value = match token.token_type {
            TokenType::Number => {
                self.advance();
                Expression::Number(token.value.clone())
            }
            TokenType::Duration => {
                self.advance();
                Expression::Duration(token.value.clone())
            }
            TokenType::Boolean => {
                self.advance();
                Expression::Boolean(token.value == "true")
            }
            TokenType::StringStart => {
                let lit = self.parse_string_lit(StringCtx::Argument);
                Expression::String(lit.literal_text().unwrap_or_default())
            }
            TokenType::Identifier => {
                self.advance();
                let name = token.value.clone();
                if let Some(param) = entry {
                    if param.param_type != ParamType::Identifier {
                        self.defer_var_check(&name, param.param_type, decorator, parameter, &token);
                    }
                }
                return Some(Expression::Identifier(name));
            }
            TokenType::At => {
                self.error_at(
                    ParseErrorKind::WrongDecoratorKind,
                    "value decorators cannot be used as decorator argument values",
                    &token,
                );
                self.skip_embedded_call();
                return None;
            }
            _ => {
                self.error_at(
                    ParseErrorKind::UnexpectedToken,
                    format!(
                        "expected a value for parameter '{parameter}' of @{decorator}; got {}",
                        describe(&token)
                    ),
                    &token,
                );
                return None;
            }
        };

        if let Some(param) = entry {
            if !value_matches(param.param_type, &value) {
                self.error_at(
                    ParseErrorKind::ParameterTypeMismatch,
                    format!(
                        "parameter '{parameter}' of @{decorator} expects {}, got {}",
                        param.param_type.as_str(),
                        value.type_name()
                    ),
                    &token,
                );
            }
        }
        Some(value)
    }

    /// Consume an `@name(...)` that appeared where a value was expected.
    fn skip_embedded_call(&mut self) {
        self.advance(); // @
        if self.check(TokenType::Identifier) {
            self.advance();
        }
        if self.check(TokenType::LParen) {
            let mut depth = 0usize;
            loop {
                match self.current().token_type {
                    TokenType::LParen => {
                        depth += 1;
                        self.advance();
                    }
                    TokenType::RParen => {
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
    }

    // ===========================================================================
    // BLOCK DECORATORS
    // ===========================================================================

    pub(crate) fn parse_block_decorator(&mut self) -> Option<BlockDecorator> {
        let (name, args, name_token) = self.parse_decorator_header()?;
        if !self.check(TokenType::LBrace) {
            self.error_at(
                ParseErrorKind::WrongDecoratorKind,
                format!("block decorator @{name} requires a '{{ ... }}' body"),
                &name_token,
            );
            return None;
        }
        let open = self.advance();
        let content = self.parse_block_content();
        if self.check(TokenType::RBrace) {
            self.advance();
        } else {
            self.error_at(
                ParseErrorKind::UnclosedBrace,
                format!("unclosed '{{' in @{name} body"),
                &open,
            );
        }
        Some(BlockDecorator {
            name,
            args,
            content,
        })
    }

    // ===========================================================================
    // PATTERN DECORATORS
    // ===========================================================================

    pub(crate) fn parse_pattern_decorator(&mut self) -> Option<PatternDecorator> {
        let (name, args, name_token) = self.parse_decorator_header()?;
        if !self.check(TokenType::LBrace) {
            self.error_at(
                ParseErrorKind::WrongDecoratorKind,
                format!("pattern decorator @{name} requires '{{ ... }}' branches"),
                &name_token,
            );
            return None;
        }
        let open = self.advance();
        let schema = self.registry.pattern_schema(&name).cloned();
        let mut branches: Vec<PatternBranch> = Vec::new();
        loop {
            if !self.tick() {
                break;
            }
            self.skip_trivia();
            match self.current().token_type {
                TokenType::RBrace => {
                    self.advance();
                    break;
                }
                TokenType::Eof => {
                    self.error_at(
                        ParseErrorKind::UnclosedBrace,
                        format!("unclosed '{{' in @{name} branches"),
                        &open,
                    );
                    break;
                }
                TokenType::ShellEnd => {
                    self.advance();
                }
                TokenType::Identifier if self.peek(1).token_type == TokenType::Colon => {
                    if let Some(branch) = self.parse_pattern_branch(&name, schema.as_ref(), &branches)
                    {
                        branches.push(branch);
                    }
                }
                _ => {
                    let token = self.current().clone();
                    self.error_at(
                        ParseErrorKind::UnexpectedToken,
                        format!(
                            "expected a branch name in @{name}; got {}",
                            describe(&token)
                        ),
                        &token,
                    );
                    self.advance();
                }
            }
        }

        if let Some(schema) = &schema {
            for required in &schema.required_patterns {
                let present = branches.iter().any(|b| b.pattern.as_str() == required);
                if !present {
                    self.error_at(
                        ParseErrorKind::MissingPattern,
                        format!("@{name} requires a '{required}' branch"),
                        &name_token,
                    );
                }
            }
        }
        Some(PatternDecorator {
            name,
            args,
            patterns: branches,
        })
    }

    /// One `pattern: body` clause. `default` is rewritten to the wildcard.
    fn parse_pattern_branch(
        &mut self,
        decorator: &str,
        schema: Option<&PatternSchema>,
        seen: &[PatternBranch],
    ) -> Option<PatternBranch> {
        let label = self.advance();
        self.advance(); // :
        let pattern = if label.value == "default" {
            BranchPattern::Wildcard
        } else {
            BranchPattern::Identifier(label.value.clone())
        };

        if let Some(schema) = schema {
            if !schema.allows(&label.value) {
                if label.value == "default" {
                    self.error_at(
                        ParseErrorKind::DisallowedPattern,
                        format!("@{decorator} does not allow a 'default' branch"),
                        &label,
                    );
                } else {
                    let allowed = if schema.allowed_patterns.is_empty() {
                        String::new()
                    } else {
                        format!("; allowed: {}", schema.allowed_patterns.join(", "))
                    };
                    self.error_at(
                        ParseErrorKind::UnknownPattern,
                        format!(
                            "unknown branch '{}' for @{decorator}{allowed}",
                            label.value
                        ),
                        &label,
                    );
                }
            }
        }
        if seen.iter().any(|b| b.pattern == pattern) {
            self.error_at(
                ParseErrorKind::DuplicatePattern,
                format!("branch '{}' of @{decorator} given more than once", label.value),
                &label,
            );
        }

        let commands = self.parse_branch_body(&label);
        Some(PatternBranch { pattern, commands })
    }

    /// A branch body: an explicit `{ ... }` block or a single content item.
    fn parse_branch_body(&mut self, label: &Token) -> Vec<CommandContent> {
        match self.current().token_type {
            TokenType::LBrace => {
                let open = self.advance();
                let items = self.parse_block_content();
                if self.check(TokenType::RBrace) {
                    self.advance();
                } else {
                    self.error_at(
                        ParseErrorKind::UnclosedBrace,
                        format!("unclosed '{{' in branch '{}'", label.value),
                        &open,
                    );
                }
                items
            }
            TokenType::At if self.peek(1).token_type == TokenType::Identifier => {
                let name = self.peek(1).value.clone();
                if self.registry.is_pattern(&name) {
                    return self
                        .parse_pattern_decorator()
                        .map(CommandContent::Pattern)
                        .into_iter()
                        .collect();
                }
                if self.registry.is_block(&name) {
                    return self
                        .parse_block_decorator()
                        .map(CommandContent::Block)
                        .into_iter()
                        .collect();
                }
                self.parse_shell_statement().into_iter().collect()
            }
            TokenType::ShellText | TokenType::StringStart | TokenType::At => {
                self.parse_shell_statement().into_iter().collect()
            }
            _ => {
                // `prod:` with nothing after it
                self.error_at(
                    ParseErrorKind::EmptyBranch,
                    format!("branch '{}' has no body", label.value),
                    label,
                );
                Vec::new()
            }
        }
    }
}

/// Literal-to-schema type agreement. Identifiers never reach here; they are
/// resolved against the variable table instead.
fn value_matches(param_type: ParamType, value: &Expression) -> bool {
    matches!(
        (param_type, value),
        (ParamType::String, Expression::String(_))
            | (ParamType::Number, Expression::Number(_))
            | (ParamType::Duration, Expression::Duration(_))
            | (ParamType::Boolean, Expression::Boolean(_))
    )
}
