//! Command Declaration and Body Parsing
//!
//! Handles `[watch|stop] NAME: body` declarations and the three body
//! surface forms, normalizing them to one canonical content list:
//!
//! 1. `@decorator(args) { ... }` directly after the colon (sugar)
//! 2. `{ ... }` explicit block
//! 3. a single inline shell line
//!
//! A body of one simple shell line produces the same AST with or without
//! braces.

use crate::ast::types::{CommandContent, CommandDecl, CommandKind};
use crate::parser::lexer::TokenType;
use crate::parser::parser::{describe, Parser};
use crate::parser::types::ParseErrorKind;

impl<'r> Parser<'r> {
    pub(crate) fn parse_command_decl(&mut self) -> Option<CommandDecl> {
        let line = self.current().line;
        let kind = match self.current().token_type {
            TokenType::Watch => {
                self.advance();
                CommandKind::Watch
            }
            TokenType::Stop => {
                self.advance();
                CommandKind::Stop
            }
            _ => CommandKind::Command,
        };
        let name = match self.expect(TokenType::Identifier, "expected command name") {
            Some(token) => token.value,
            None => {
                self.synchronize();
                return None;
            }
        };
        if self
            .expect(TokenType::Colon, "expected ':' after command name")
            .is_none()
        {
            self.synchronize();
            return None;
        }
        let body = self.parse_command_body();
        Some(CommandDecl {
            kind,
            name,
            body,
            line,
        })
    }

    /// Parse a command body in any of its three surface forms.
    fn parse_command_body(&mut self) -> Vec<CommandContent> {
        self.skip_trivia();
        match self.current().token_type {
            // Sugar: `@decorator(args) { ... }` straight after the colon
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
                // Value, action, or unknown: an inline shell statement
                self.parse_shell_statement().into_iter().collect()
            }
            // Explicit block
            TokenType::LBrace => {
                let open = self.advance();
                let items = self.parse_block_content();
                if self.check(TokenType::RBrace) {
                    self.advance();
                } else {
                    self.error_at(
                        ParseErrorKind::UnclosedBrace,
                        "unclosed '{' in command body",
                        &open,
                    );
                }
                items
            }
            // Single inline shell line
            TokenType::ShellText | TokenType::StringStart | TokenType::At => {
                self.parse_shell_statement().into_iter().collect()
            }
            // Empty body: `NAME:` followed by the next declaration or EOF
            _ => Vec::new(),
        }
    }

    /// Parse items inside a `{ ... }` body until the closing brace. Each
    /// iteration appends at most one content item; consecutive shell lines
    /// become separate entries.
    pub(crate) fn parse_block_content(&mut self) -> Vec<CommandContent> {
        let mut items = Vec::new();
        if !self.enter() {
            return items;
        }
        loop {
            if !self.tick() {
                break;
            }
            self.skip_trivia();
            match self.current().token_type {
                TokenType::RBrace | TokenType::Eof => break,
                TokenType::ShellEnd => {
                    self.advance();
                }
                TokenType::At if self.peek(1).token_type == TokenType::Identifier => {
                    let name = self.peek(1).value.clone();
                    if self.registry.is_pattern(&name) {
                        if let Some(pattern) = self.parse_pattern_decorator() {
                            items.push(CommandContent::Pattern(pattern));
                        }
                    } else if self.registry.is_block(&name) {
                        if let Some(block) = self.parse_block_decorator() {
                            items.push(CommandContent::Block(block));
                        }
                    } else if let Some(item) = self.parse_shell_statement() {
                        items.push(item);
                    }
                }
                TokenType::ShellText | TokenType::StringStart | TokenType::At => {
                    if let Some(item) = self.parse_shell_statement() {
                        items.push(item);
                    }
                }
                _ => {
                    let token = self.current().clone();
                    self.error_at(
                        ParseErrorKind::UnexpectedToken,
                        format!("unexpected {} in command body", describe(&token)),
                        &token,
                    );
                    self.advance();
                    if !self.sync_in_block() {
                        break;
                    }
                }
            }
        }
        self.leave();
        items
    }

    /// Recover to the next line inside a block body. Returns false when the
    /// block (or input) ended.
    fn sync_in_block(&mut self) -> bool {
        loop {
            match self.current().token_type {
                TokenType::RBrace | TokenType::Eof => return false,
                TokenType::ShellEnd => {
                    self.advance();
                    return true;
                }
                TokenType::At => {
                    let name = self.peek(1);
                    if name.token_type == TokenType::Identifier
                        && (self.registry.is_block(&name.value)
                            || self.registry.is_pattern(&name.value))
                    {
                        return true;
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}
