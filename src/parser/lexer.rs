//! Lexer for Devcmd Files
//!
//! The lexer tokenizes input into a stream of tokens that the parser
//! consumes. It is mode-switching: a small mode stack distinguishes
//! language tokens from shell-literal runs, string-interpolated runs, and
//! decorator argument lists. Transitions are driven purely by local
//! syntactic events; the lexer never consults the parser.
//!
//! Modes:
//! - `Language`: the default; identifiers, keywords, literals, punctuation
//! - `Shell`: command bodies; emits `ShellText` runs and shell operators
//! - `Str`: quoted strings; `"` and backtick interpolate `@name(...)`
//! - `Args`: the `(...)` of a decorator call; language-style tokens

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::ast::types::QuoteStyle;
use crate::parser::types::{ParseError, ParseErrorKind};

/// Token types for the devcmd lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,
    // Invalid input; the parser reports and recovers
    Illegal,

    // Structural
    LBrace,
    RBrace,
    LParen,
    RParen,
    Colon,
    Comma,
    Equals,
    At,

    // Keywords
    Var,
    Watch,
    Stop,

    // Identifiers and literals
    Identifier,
    Number,
    Duration,
    Boolean,

    // String pieces
    StringStart,
    StringText,
    StringEnd,

    // Shell pieces
    ShellText,
    ShellEnd,
    Pipe,   // |
    And,    // &&
    Or,     // ||
    Append, // >>

    // Trivia
    Comment,
    MultilineComment,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Illegal => "ILLEGAL",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Equals => "=",
            Self::At => "@",
            Self::Var => "var",
            Self::Watch => "watch",
            Self::Stop => "stop",
            Self::Identifier => "IDENTIFIER",
            Self::Number => "NUMBER",
            Self::Duration => "DURATION",
            Self::Boolean => "BOOLEAN",
            Self::StringStart => "STRING_START",
            Self::StringText => "STRING_TEXT",
            Self::StringEnd => "STRING_END",
            Self::ShellText => "SHELL_TEXT",
            Self::ShellEnd => "SHELL_END",
            Self::Pipe => "|",
            Self::And => "&&",
            Self::Or => "||",
            Self::Append => ">>",
            Self::Comment => "COMMENT",
            Self::MultilineComment => "MULTILINE_COMMENT",
        }
    }
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Original position in input
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        value: impl Into<String>,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            token_type,
            value: value.into(),
            start,
            end,
            line,
            column,
        }
    }
}

lazy_static! {
    /// Reserved words in devcmd
    static ref KEYWORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("var", TokenType::Var);
        m.insert("watch", TokenType::Watch);
        m.insert("stop", TokenType::Stop);
        m.insert("true", TokenType::Boolean);
        m.insert("false", TokenType::Boolean);
        m
    };
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn quote_style(c: char) -> Option<QuoteStyle> {
    match c {
        '"' => Some(QuoteStyle::Double),
        '\'' => Some(QuoteStyle::Single),
        '`' => Some(QuoteStyle::Backtick),
        _ => None,
    }
}

/// Lexer mode. The stack bottom is always `Language`.
#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Language,
    Shell(ShellState),
    Str(StrState),
    Args { paren_depth: usize },
}

/// Shell-mode bookkeeping for one command body
#[derive(Debug, Clone, PartialEq)]
struct ShellState {
    /// Braces opened inside this shell context (body block + block decorators)
    brace_depth: usize,
    /// Whether the current logical line produced any content tokens
    line_has_content: bool,
    /// Literal (non-structural) `{` seen in the current line's text
    literal_braces: usize,
}

impl ShellState {
    fn new() -> Self {
        Self {
            brace_depth: 0,
            line_has_content: false,
            literal_braces: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StrState {
    style: QuoteStyle,
    start: usize,
    start_line: usize,
    start_column: usize,
}

/// Mode-switching lexer
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
    modes: Vec<Mode>,
    /// Paren depth while in `Language` mode (var groups)
    lang_parens: usize,
    /// Pending text run for `ShellText` / `StringText`
    buf: String,
    buf_start: usize,
    buf_line: usize,
    buf_column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
            modes: vec![Mode::Language],
            lang_parens: 0,
            buf: String::new(),
            buf_start: 0,
            buf_line: 1,
            buf_column: 1,
        }
    }

    /// Tokenize the entire input. Always runs to the end and terminates the
    /// stream with `Eof`; invalid input yields `Illegal` tokens and recorded
    /// errors rather than aborting.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<ParseError>) {
        while self.pos < self.input.len() {
            match self.mode().clone() {
                Mode::Language => self.lex_language(),
                Mode::Shell(_) => self.lex_shell(),
                Mode::Str(state) => self.lex_string(&state),
                Mode::Args { .. } => self.lex_args(),
            }
        }
        self.finish();
        (self.tokens, self.errors)
    }

    // ===========================================================================
    // CURSOR HELPERS
    // ===========================================================================

    fn mode(&self) -> &Mode {
        self.modes.last().unwrap_or(&Mode::Language)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn emit(&mut self, token_type: TokenType, value: impl Into<String>, start: usize, line: usize, column: usize) {
        let end = self.pos;
        self.tokens.push(Token::new(token_type, value, start, end, line, column));
    }

    /// Emit a single-character token at the cursor and consume it.
    fn emit_char(&mut self, token_type: TokenType) {
        let (start, line, column) = (self.pos, self.line, self.column);
        let c = self.advance().unwrap_or_default();
        self.emit(token_type, c.to_string(), start, line, column);
    }

    fn push_buf(&mut self, c: char) {
        if self.buf.is_empty() {
            self.buf_start = self.pos;
            self.buf_line = self.line;
            self.buf_column = self.column;
        }
        self.buf.push(c);
    }

    fn flush_buf(&mut self, token_type: TokenType) {
        if self.buf.is_empty() {
            return;
        }
        let value = std::mem::take(&mut self.buf);
        let (start, line, column) = (self.buf_start, self.buf_line, self.buf_column);
        self.emit(token_type, value, start, line, column);
    }

    fn record_error(&mut self, kind: ParseErrorKind, message: impl Into<String>, line: usize, column: usize, start: usize) {
        self.errors
            .push(ParseError::new(kind, message, line, column).with_span(start, self.pos));
    }

    /// Scan an identifier starting at `at`; returns its length in chars.
    fn ident_len_at(&self, at: usize) -> usize {
        let mut len = 0;
        if self.input.get(at).copied().is_some_and(is_ident_start) {
            len = 1;
            while self.input.get(at + len).copied().is_some_and(is_ident_char) {
                len += 1;
            }
        }
        len
    }

    // ===========================================================================
    // LANGUAGE MODE
    // ===========================================================================

    fn lex_language(&mut self) {
        let c = match self.current() {
            Some(c) => c,
            None => return,
        };
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                self.advance();
            }
            '#' => self.lex_line_comment(),
            '/' if self.peek(1) == Some('*') => self.lex_block_comment(),
            '{' => self.emit_char(TokenType::LBrace),
            '}' => self.emit_char(TokenType::RBrace),
            '(' => {
                self.lang_parens += 1;
                self.emit_char(TokenType::LParen);
            }
            ')' => {
                self.lang_parens = self.lang_parens.saturating_sub(1);
                self.emit_char(TokenType::RParen);
            }
            ',' => self.emit_char(TokenType::Comma),
            '=' => self.emit_char(TokenType::Equals),
            '@' => self.emit_char(TokenType::At),
            ':' => {
                self.emit_char(TokenType::Colon);
                // A colon outside parentheses introduces a command body
                if self.lang_parens == 0 {
                    self.modes.push(Mode::Shell(ShellState::new()));
                    self.skip_inline_spaces();
                }
            }
            '"' | '\'' | '`' => self.lex_string_start(),
            _ => {
                if !self.lex_word_or_literal() {
                    self.lex_illegal_run();
                }
            }
        }
    }

    /// Scan identifiers, keywords, booleans, numbers, and durations.
    /// Shared by `Language` and `Args` modes. Returns false if the current
    /// character starts none of these.
    fn lex_word_or_literal(&mut self) -> bool {
        let c = match self.current() {
            Some(c) => c,
            None => return true,
        };
        if is_ident_start(c) {
            let (start, line, column) = (self.pos, self.line, self.column);
            let len = self.ident_len_at(self.pos);
            let word: String = self.input[start..start + len].iter().collect();
            for _ in 0..len {
                self.advance();
            }
            let token_type = KEYWORDS.get(word.as_str()).copied().unwrap_or(TokenType::Identifier);
            self.emit(token_type, word, start, line, column);
            return true;
        }
        if c.is_ascii_digit() || (c == '-' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            self.lex_number_or_duration();
            return true;
        }
        false
    }

    fn lex_number_or_duration(&mut self) {
        let (start, line, column) = (self.pos, self.line, self.column);
        let mut text = String::new();
        if self.current() == Some('-') {
            text.push('-');
            self.advance();
        }
        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance().unwrap_or_default());
        }
        if self.current() == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while self.current().is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.advance().unwrap_or_default());
            }
        }

        // Duration unit directly after the number: ms | s | m | h
        let unit_len = match (self.current(), self.peek(1)) {
            (Some('m'), Some('s')) if !self.peek(2).is_some_and(is_ident_char) => 2,
            (Some('s') | Some('m') | Some('h'), next) if !next.is_some_and(is_ident_char) => 1,
            _ => 0,
        };
        if unit_len > 0 {
            for _ in 0..unit_len {
                text.push(self.advance().unwrap_or_default());
            }
            self.emit(TokenType::Duration, text, start, line, column);
            return;
        }

        // Trailing identifier characters make the whole run illegal (e.g. `30x`)
        if self.current().is_some_and(is_ident_char) {
            while self.current().is_some_and(is_ident_char) {
                text.push(self.advance().unwrap_or_default());
            }
            self.emit(TokenType::Illegal, text, start, line, column);
            return;
        }
        self.emit(TokenType::Number, text, start, line, column);
    }

    fn lex_illegal_run(&mut self) {
        let (start, line, column) = (self.pos, self.line, self.column);
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c.is_whitespace() || is_ident_start(c) || c.is_ascii_digit() {
                break;
            }
            if matches!(c, '{' | '}' | '(' | ')' | ':' | ',' | '=' | '@' | '"' | '\'' | '`' | '#') {
                break;
            }
            text.push(self.advance().unwrap_or_default());
        }
        if text.is_empty() {
            // must make progress
            if let Some(c) = self.advance() {
                text.push(c);
            }
        }
        self.emit(TokenType::Illegal, text, start, line, column);
    }

    fn lex_line_comment(&mut self) {
        let (start, line, column) = (self.pos, self.line, self.column);
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            if c == '\r' && self.peek(1) == Some('\n') {
                break;
            }
            text.push(self.advance().unwrap_or_default());
        }
        self.emit(TokenType::Comment, text, start, line, column);
    }

    fn lex_block_comment(&mut self) {
        let (start, line, column) = (self.pos, self.line, self.column);
        let mut text = String::new();
        text.push(self.advance().unwrap_or_default()); // '/'
        text.push(self.advance().unwrap_or_default()); // '*'
        loop {
            match self.current() {
                Some('*') if self.peek(1) == Some('/') => {
                    text.push(self.advance().unwrap_or_default());
                    text.push(self.advance().unwrap_or_default());
                    break;
                }
                Some(_) => text.push(self.advance().unwrap_or_default()),
                None => {
                    self.record_error(
                        ParseErrorKind::UnterminatedComment,
                        "unterminated block comment",
                        line,
                        column,
                        start,
                    );
                    break;
                }
            }
        }
        self.emit(TokenType::MultilineComment, text, start, line, column);
    }

    fn lex_string_start(&mut self) {
        let style = match self.current().and_then(quote_style) {
            Some(style) => style,
            None => return,
        };
        let state = StrState {
            style,
            start: self.pos,
            start_line: self.line,
            start_column: self.column,
        };
        self.emit_char(TokenType::StringStart);
        self.modes.push(Mode::Str(state));
    }

    fn skip_inline_spaces(&mut self) {
        while matches!(self.current(), Some(' ') | Some('\t')) {
            self.advance();
        }
    }

    // ===========================================================================
    // SHELL MODE
    // ===========================================================================

    fn shell_state(&mut self) -> &mut ShellState {
        for mode in self.modes.iter_mut().rev() {
            if let Mode::Shell(state) = mode {
                return state;
            }
        }
        unreachable!("lex_shell called outside shell mode")
    }

    fn lex_shell(&mut self) {
        let c = match self.current() {
            Some(c) => c,
            None => return,
        };

        // Line continuation joins the next line with a single space
        if c == '\\' && (self.peek(1) == Some('\n') || (self.peek(1) == Some('\r') && self.peek(2) == Some('\n'))) {
            self.advance(); // backslash
            if self.current() == Some('\r') {
                self.advance();
            }
            self.advance(); // newline
            if !self.buf.is_empty() {
                while self.buf.ends_with(' ') || self.buf.ends_with('\t') {
                    self.buf.pop();
                }
                self.buf.push(' ');
            }
            self.skip_inline_spaces();
            return;
        }

        if c == '\r' && self.peek(1) == Some('\n') {
            self.advance();
            return;
        }

        if c == '\n' {
            self.end_shell_line();
            return;
        }

        let at_statement = self.buf.is_empty() && !self.shell_state().line_has_content;
        if at_statement {
            match c {
                '#' => {
                    self.lex_line_comment();
                    return;
                }
                '/' if self.peek(1) == Some('*') => {
                    self.lex_block_comment();
                    return;
                }
                '@' if self.peek(1).is_some_and(is_ident_start) => {
                    self.lex_shell_decorator();
                    return;
                }
                _ if is_ident_start(c) && self.try_branch_label() => return,
                _ => {}
            }
        } else if c == '@' {
            // Mid-line, only `@name(` cuts a decorator; everything else is literal
            let len = self.ident_len_at(self.pos + 1);
            if len > 0 && self.input.get(self.pos + 1 + len) == Some(&'(') {
                self.lex_shell_decorator();
                return;
            }
            self.push_buf(c);
            self.advance();
            return;
        }

        match c {
            ' ' | '\t' => {
                let mid_line = self.shell_state().line_has_content || !self.buf.is_empty();
                if mid_line {
                    // A wide gap before `name:` separates branches written on
                    // one line; a single space keeps `echo error: x` literal
                    if self.shell_state().literal_braces == 0 && self.label_after_gap() {
                        self.flush_buf(TokenType::ShellText);
                        self.skip_inline_spaces();
                        self.try_branch_label();
                        return;
                    }
                    self.push_buf(c);
                }
                self.advance();
            }
            '{' => {
                // Structural only at a statement position or right after a
                // decorator header; `echo {a,b}` and `echo "x" {y}` stay text
                let after_header = matches!(
                    self.tokens.last().map(|t| t.token_type),
                    Some(TokenType::RParen) | Some(TokenType::Identifier)
                );
                let structural = self.buf.trim().is_empty()
                    && (!self.shell_state().line_has_content || after_header);
                if structural {
                    self.buf.clear();
                    self.emit_char(TokenType::LBrace);
                    let state = self.shell_state();
                    state.brace_depth += 1;
                    state.line_has_content = false;
                    state.literal_braces = 0;
                } else {
                    self.shell_state().literal_braces += 1;
                    self.push_buf(c);
                    self.advance();
                }
            }
            '}' => {
                if self.shell_state().literal_braces > 0 {
                    self.shell_state().literal_braces -= 1;
                    self.push_buf(c);
                    self.advance();
                } else {
                    self.close_shell_brace();
                }
            }
            '|' => {
                self.shell_operator(if self.peek(1) == Some('|') {
                    TokenType::Or
                } else {
                    TokenType::Pipe
                });
            }
            '&' if self.peek(1) == Some('&') => self.shell_operator(TokenType::And),
            '>' if self.peek(1) == Some('>') => self.shell_operator(TokenType::Append),
            '"' | '\'' | '`' => {
                self.flush_buf(TokenType::ShellText);
                self.shell_state().line_has_content = true;
                self.lex_string_start();
            }
            _ => {
                self.push_buf(c);
                self.shell_state().line_has_content = true;
                self.advance();
            }
        }
    }

    /// Newline in shell mode: terminate the logical line.
    fn end_shell_line(&mut self) {
        self.flush_buf(TokenType::ShellText);
        let has_content = self.shell_state().line_has_content;
        if has_content {
            let (start, line, column) = (self.pos, self.line, self.column);
            self.emit(TokenType::ShellEnd, "", start, line, column);
        }
        self.advance(); // newline
        if self.shell_state().brace_depth == 0 {
            self.modes.pop();
        } else {
            let state = self.shell_state();
            state.line_has_content = false;
            state.literal_braces = 0;
        }
    }

    /// Structural `}`: flush the pending line and close one brace level.
    fn close_shell_brace(&mut self) {
        self.flush_buf(TokenType::ShellText);
        let state = self.shell_state();
        if state.line_has_content {
            let (start, line, column) = (self.pos, self.line, self.column);
            self.emit(TokenType::ShellEnd, "", start, line, column);
        }
        self.emit_char(TokenType::RBrace);
        let state = self.shell_state();
        state.brace_depth = state.brace_depth.saturating_sub(1);
        state.line_has_content = false;
        state.literal_braces = 0;
    }

    fn shell_operator(&mut self, token_type: TokenType) {
        self.flush_buf(TokenType::ShellText);
        self.shell_state().line_has_content = true;
        let (start, line, column) = (self.pos, self.line, self.column);
        let len = if token_type == TokenType::Pipe { 1 } else { 2 };
        let mut value = String::new();
        for _ in 0..len {
            value.push(self.advance().unwrap_or_default());
        }
        self.emit(token_type, value, start, line, column);
        self.skip_inline_spaces();
    }

    /// `@name` at statement position, or `@name(` mid-line. Emits `At` and
    /// `Identifier`, then enters `Args` mode if a call follows.
    fn lex_shell_decorator(&mut self) {
        self.flush_buf(TokenType::ShellText);
        self.shell_state().line_has_content = true;
        self.emit_char(TokenType::At);
        let (start, line, column) = (self.pos, self.line, self.column);
        let len = self.ident_len_at(self.pos);
        let name: String = self.input[start..start + len].iter().collect();
        for _ in 0..len {
            self.advance();
        }
        self.emit(TokenType::Identifier, name, start, line, column);
        if self.current() == Some('(') {
            self.emit_char(TokenType::LParen);
            self.modes.push(Mode::Args { paren_depth: 1 });
        }
    }

    /// Mid-line, a branch label is only recognized after a gap of at least
    /// two spaces or a tab.
    fn label_after_gap(&self) -> bool {
        let mut j = self.pos;
        let mut gap = 0usize;
        let mut has_tab = false;
        while let Some(c) = self.input.get(j) {
            match c {
                ' ' => gap += 1,
                '\t' => {
                    has_tab = true;
                    gap += 1;
                }
                _ => break,
            }
            j += 1;
        }
        if gap < 2 && !has_tab {
            return false;
        }
        let len = self.ident_len_at(j);
        if len == 0 || self.input.get(j + len) != Some(&':') {
            return false;
        }
        matches!(
            self.input.get(j + len + 1),
            None | Some(' ') | Some('\t') | Some('\n') | Some('\r') | Some('{')
        )
    }

    /// At statement position, `name:` followed by whitespace, `{`, or end of
    /// line is a pattern-branch label. Returns true if one was consumed.
    fn try_branch_label(&mut self) -> bool {
        let len = self.ident_len_at(self.pos);
        if len == 0 || self.input.get(self.pos + len) != Some(&':') {
            return false;
        }
        match self.input.get(self.pos + len + 1) {
            None | Some(' ') | Some('\t') | Some('\n') | Some('\r') | Some('{') => {}
            Some(_) => return false,
        }
        let (start, line, column) = (self.pos, self.line, self.column);
        let name: String = self.input[start..start + len].iter().collect();
        for _ in 0..len {
            self.advance();
        }
        self.emit(TokenType::Identifier, name, start, line, column);
        self.emit_char(TokenType::Colon);
        self.skip_inline_spaces();
        // The branch body begins a fresh statement position
        self.shell_state().line_has_content = false;
        true
    }

    // ===========================================================================
    // STRING MODE
    // ===========================================================================

    fn lex_string(&mut self, state: &StrState) {
        let quote = state.style.quote_char();
        let c = match self.current() {
            Some(c) => c,
            None => return,
        };

        if c == quote {
            self.flush_buf(TokenType::StringText);
            self.emit_char(TokenType::StringEnd);
            self.modes.pop();
            return;
        }

        if c == '\\' {
            if !state.style.interpolates() {
                // Single quotes are verbatim
                self.push_buf(c);
                self.advance();
                return;
            }
            match self.peek(1) {
                Some(next) if next == quote => {
                    self.advance();
                    self.advance();
                    self.push_buf(quote);
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                    self.push_buf('\\');
                }
                Some('n') => {
                    self.advance();
                    self.advance();
                    self.push_buf('\n');
                }
                Some('t') => {
                    self.advance();
                    self.advance();
                    self.push_buf('\t');
                }
                Some('r') => {
                    self.advance();
                    self.advance();
                    self.push_buf('\r');
                }
                // Raw backslash-newline is preserved in the text
                Some('\n') => {
                    self.push_buf('\\');
                    self.push_buf('\n');
                    self.advance();
                    self.advance();
                }
                Some('\r') if self.peek(2) == Some('\n') => {
                    self.push_buf('\\');
                    self.push_buf('\n');
                    self.advance();
                    self.advance();
                    self.advance();
                }
                Some(other) => {
                    let (line, column, start) = (self.line, self.column, self.pos);
                    self.record_error(
                        ParseErrorKind::InvalidEscape,
                        format!("invalid escape '\\{other}' in string"),
                        line,
                        column,
                        start,
                    );
                    self.push_buf('\\');
                    self.advance();
                    self.push_buf(other);
                    self.advance();
                }
                None => {
                    self.push_buf('\\');
                    self.advance();
                }
            }
            return;
        }

        if c == '@' && state.style.interpolates() {
            let len = self.ident_len_at(self.pos + 1);
            if len > 0 && self.input.get(self.pos + 1 + len) == Some(&'(') {
                self.flush_buf(TokenType::StringText);
                self.emit_char(TokenType::At);
                let (start, line, column) = (self.pos, self.line, self.column);
                let name: String = self.input[start..start + len].iter().collect();
                for _ in 0..len {
                    self.advance();
                }
                self.emit(TokenType::Identifier, name, start, line, column);
                self.emit_char(TokenType::LParen);
                self.modes.push(Mode::Args { paren_depth: 1 });
                return;
            }
        }

        if c == '\r' && self.peek(1) == Some('\n') {
            self.advance();
            self.advance();
            self.push_buf('\n');
            return;
        }

        self.push_buf(c);
        self.advance();
    }

    // ===========================================================================
    // DECORATOR ARGUMENT MODE
    // ===========================================================================

    fn args_depth(&mut self) -> &mut usize {
        for mode in self.modes.iter_mut().rev() {
            if let Mode::Args { paren_depth } = mode {
                return paren_depth;
            }
        }
        unreachable!("lex_args called outside args mode")
    }

    fn lex_args(&mut self) {
        let c = match self.current() {
            Some(c) => c,
            None => return,
        };
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                self.advance();
            }
            '#' => self.lex_line_comment(),
            '(' => {
                *self.args_depth() += 1;
                self.emit_char(TokenType::LParen);
            }
            ')' => {
                let depth = self.args_depth();
                *depth -= 1;
                let closed = *depth == 0;
                self.emit_char(TokenType::RParen);
                if closed {
                    self.modes.pop();
                }
            }
            ',' => self.emit_char(TokenType::Comma),
            '=' => self.emit_char(TokenType::Equals),
            ':' => self.emit_char(TokenType::Colon),
            '@' => self.emit_char(TokenType::At),
            '{' => self.emit_char(TokenType::LBrace),
            '}' => self.emit_char(TokenType::RBrace),
            '"' | '\'' | '`' => self.lex_string_start(),
            _ => {
                if !self.lex_word_or_literal() {
                    self.lex_illegal_run();
                }
            }
        }
    }

    // ===========================================================================
    // END OF INPUT
    // ===========================================================================

    fn finish(&mut self) {
        while let Some(mode) = self.modes.pop() {
            match mode {
                Mode::Str(state) => {
                    self.record_error(
                        ParseErrorKind::UnterminatedString,
                        format!("unterminated string starting at {}:{}", state.start_line, state.start_column),
                        state.start_line,
                        state.start_column,
                        state.start,
                    );
                    self.flush_buf(TokenType::StringText);
                    let (start, line, column) = (self.pos, self.line, self.column);
                    self.emit(TokenType::Illegal, "", start, line, column);
                }
                Mode::Shell(state) => {
                    self.flush_buf(TokenType::ShellText);
                    if state.line_has_content {
                        let (start, line, column) = (self.pos, self.line, self.column);
                        self.emit(TokenType::ShellEnd, "", start, line, column);
                    }
                }
                Mode::Args { .. } | Mode::Language => {}
            }
        }
        let (start, line, column) = (self.pos, self.line, self.column);
        self.emit(TokenType::Eof, "", start, line, column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let (tokens, errors) = Lexer::new(input).tokenize();
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenType> {
        tokens.iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn test_empty_input() {
        let tokens = lex("");
        assert_eq!(kinds(&tokens), vec![TokenType::Eof]);
    }

    #[test]
    fn test_var_declaration() {
        let tokens = lex("var PORT = 8080");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Var,
                TokenType::Identifier,
                TokenType::Equals,
                TokenType::Number,
                TokenType::Eof,
            ]
        );
        assert_eq!(tokens[1].value, "PORT");
        assert_eq!(tokens[3].value, "8080");
    }

    #[test]
    fn test_duration_literal() {
        let tokens = lex("var T = 30s");
        assert_eq!(tokens[3].token_type, TokenType::Duration);
        assert_eq!(tokens[3].value, "30s");

        let tokens = lex("var T = 250ms");
        assert_eq!(tokens[3].token_type, TokenType::Duration);
        assert_eq!(tokens[3].value, "250ms");
    }

    #[test]
    fn test_boolean_literal() {
        let tokens = lex("var FLAG = true");
        assert_eq!(tokens[3].token_type, TokenType::Boolean);
        assert_eq!(tokens[3].value, "true");
    }

    #[test]
    fn test_boolean_prefix_is_identifier() {
        let tokens = lex("var A = trueish");
        assert_eq!(tokens[3].token_type, TokenType::Identifier);
        assert_eq!(tokens[3].value, "trueish");

        let tokens = lex("var B = falsely");
        assert_eq!(tokens[3].token_type, TokenType::Identifier);
    }

    #[test]
    fn test_simple_command() {
        let tokens = lex("build: echo hello");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::ShellText,
                TokenType::ShellEnd,
                TokenType::Eof,
            ]
        );
        assert_eq!(tokens[2].value, "echo hello");
    }

    #[test]
    fn test_shell_operators() {
        let tokens = lex("process: cat f | grep x | sort");
        let kinds = kinds(&tokens);
        assert_eq!(
            kinds,
            vec![
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::ShellText,
                TokenType::Pipe,
                TokenType::ShellText,
                TokenType::Pipe,
                TokenType::ShellText,
                TokenType::ShellEnd,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_and_or_append_operators() {
        let tokens = lex("go: a && b || c >> log.txt");
        let ops: Vec<TokenType> = tokens
            .iter()
            .map(|t| t.token_type)
            .filter(|t| matches!(t, TokenType::And | TokenType::Or | TokenType::Append))
            .collect();
        assert_eq!(ops, vec![TokenType::And, TokenType::Or, TokenType::Append]);
    }

    #[test]
    fn test_single_amp_is_literal() {
        let tokens = lex("serve: ./server &");
        assert_eq!(tokens[2].token_type, TokenType::ShellText);
        assert_eq!(tokens[2].value, "./server &");
    }

    #[test]
    fn test_newline_separates_shell_lines() {
        let tokens = lex("all: {\n  echo a\n  echo b\n}");
        let ends = tokens.iter().filter(|t| t.token_type == TokenType::ShellEnd).count();
        assert_eq!(ends, 2);
        let texts: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::ShellText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(texts, vec!["echo a", "echo b"]);
    }

    #[test]
    fn test_email_at_is_literal() {
        let tokens = lex("mail: send user@host.com");
        assert_eq!(tokens[2].token_type, TokenType::ShellText);
        assert_eq!(tokens[2].value, "send user@host.com");
    }

    #[test]
    fn test_inline_value_decorator() {
        let tokens = lex("serve: start --port @var(PORT)");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::ShellText,
                TokenType::At,
                TokenType::Identifier,
                TokenType::LParen,
                TokenType::Identifier,
                TokenType::RParen,
                TokenType::ShellEnd,
                TokenType::Eof,
            ]
        );
        assert_eq!(tokens[2].value, "start --port ");
        assert_eq!(tokens[4].value, "var");
        assert_eq!(tokens[6].value, "PORT");
    }

    #[test]
    fn test_block_decorator_tokens() {
        let tokens = lex("deploy: @timeout(30s) { npm run deploy }");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::At,
                TokenType::Identifier,
                TokenType::LParen,
                TokenType::Duration,
                TokenType::RParen,
                TokenType::LBrace,
                TokenType::ShellText,
                TokenType::ShellEnd,
                TokenType::RBrace,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_string_interpolation() {
        let tokens = lex("greet: echo \"Hello @var(NAME)!\"");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::ShellText,
                TokenType::StringStart,
                TokenType::StringText,
                TokenType::At,
                TokenType::Identifier,
                TokenType::LParen,
                TokenType::Identifier,
                TokenType::RParen,
                TokenType::StringText,
                TokenType::StringEnd,
                TokenType::ShellEnd,
                TokenType::Eof,
            ]
        );
        assert_eq!(tokens[2].value, "echo ");
        assert_eq!(tokens[4].value, "Hello ");
        assert_eq!(tokens[10].value, "!");
    }

    #[test]
    fn test_single_quotes_skip_interpolation() {
        let tokens = lex("greet: echo 'Hello @var(NAME)!'");
        let texts: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::StringText)
            .collect();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].value, "Hello @var(NAME)!");
    }

    #[test]
    fn test_backtick_interpolation() {
        let tokens = lex("greet: echo `v=@var(X)`");
        assert!(tokens.iter().any(|t| t.token_type == TokenType::At));
    }

    #[test]
    fn test_hash_in_shell_text_is_literal() {
        let tokens = lex("fetch: curl https://host/page#anchor");
        assert_eq!(tokens[2].token_type, TokenType::ShellText);
        assert_eq!(tokens[2].value, "curl https://host/page#anchor");
    }

    #[test]
    fn test_comment_at_shell_line_start() {
        let tokens = lex("go: {\n  # note\n  echo hi\n}");
        assert!(tokens.iter().any(|t| t.token_type == TokenType::Comment));
        let ends = tokens.iter().filter(|t| t.token_type == TokenType::ShellEnd).count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_language_comments() {
        let tokens = lex("# header\nvar X = 1\n/* multi\nline */");
        assert_eq!(tokens[0].token_type, TokenType::Comment);
        assert_eq!(tokens[0].value, "# header");
        assert!(tokens.iter().any(|t| t.token_type == TokenType::MultilineComment));
    }

    #[test]
    fn test_line_continuation_in_shell() {
        let tokens = lex("build: echo a \\\n  b");
        assert_eq!(tokens[2].token_type, TokenType::ShellText);
        assert_eq!(tokens[2].value, "echo a b");
    }

    #[test]
    fn test_crlf_line_endings() {
        let tokens = lex("var X = 1\r\nbuild: echo hi\r\n");
        assert!(tokens.iter().any(|t| t.value == "echo hi"));
    }

    #[test]
    fn test_branch_labels() {
        let tokens = lex("deploy: @when(ENV) {\n  prod: echo p\n  default: echo d\n}");
        let idents: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::Identifier)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(idents, vec!["deploy", "when", "ENV", "prod", "default"]);
    }

    #[test]
    fn test_branch_labels_on_one_line() {
        let tokens = lex("deploy: @when(ENV) { prod: echo p  dev: echo d  default: echo ? }");
        let idents: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::Identifier)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(idents, vec!["deploy", "when", "ENV", "prod", "dev", "default"]);
        let texts: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::ShellText)
            .map(|t| t.value.as_str())
            .collect();
        // the last run keeps its pre-brace space; the parser trims it
        assert_eq!(texts, vec!["echo p", "echo d", "echo ? "]);
    }

    #[test]
    fn test_single_space_colon_word_stays_text() {
        let tokens = lex("log: echo error: retry later");
        let texts: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::ShellText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(texts, vec!["echo error: retry later"]);
    }

    #[test]
    fn test_colon_in_url_is_not_label() {
        let tokens = lex("fetch: {\n  curl https://example.com\n}");
        let texts: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::ShellText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(texts, vec!["curl https://example.com"]);
    }

    #[test]
    fn test_literal_braces_in_shell_text() {
        let tokens = lex("list: echo {a,b}");
        assert_eq!(tokens[2].token_type, TokenType::ShellText);
        assert_eq!(tokens[2].value, "echo {a,b}");
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::LBrace));
    }

    #[test]
    fn test_brace_after_string_stays_text() {
        let tokens = lex("go: echo \"a\" {b,c}");
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::LBrace));
        let trailing: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::ShellText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(trailing, vec!["echo ", " {b,c}"]);
    }

    #[test]
    fn test_unterminated_string_records_error() {
        let (tokens, errors) = Lexer::new("go: echo \"oops").tokenize();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrorKind::UnterminatedString);
        assert!(tokens.iter().any(|t| t.token_type == TokenType::Illegal));
        assert_eq!(tokens.last().unwrap().token_type, TokenType::Eof);
    }

    #[test]
    fn test_illegal_characters_become_illegal_tokens() {
        let (tokens, errors) = Lexer::new("var X = ./src").tokenize();
        assert!(errors.is_empty());
        assert!(tokens.iter().any(|t| t.token_type == TokenType::Illegal));
        assert_eq!(tokens.last().unwrap().token_type, TokenType::Eof);
    }

    #[test]
    fn test_idempotent_relex() {
        let src = "var X = 5\nbuild: echo @var(X) | sort\ndeploy: @timeout(30s) { go }";
        let (first, _) = Lexer::new(src).tokenize();
        let (second, _) = Lexer::new(src).tokenize();
        assert_eq!(first, second);
    }

    #[test]
    fn test_positions_are_monotonic() {
        let src = "var X = 5\nbuild: {\n  echo hi\n}";
        let (tokens, _) = Lexer::new(src).tokenize();
        for pair in tokens.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_eof_column_past_last_char() {
        let (tokens, _) = Lexer::new("var X = 5").tokenize();
        let eof = tokens.last().unwrap();
        assert_eq!(eof.line, 1);
        assert_eq!(eof.column, 10);
    }

    #[test]
    fn test_nested_string_styles_in_args() {
        let tokens = lex("go: echo @env(PATH, default='a \"b\"')");
        let has_single = tokens
            .iter()
            .any(|t| t.token_type == TokenType::StringText && t.value == "a \"b\"");
        assert!(has_single);
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let tokens = lex("go: echo \"a \\\"b\\\" c\"");
        let text: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::StringText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(text, vec!["a \"b\" c"]);
    }

    #[test]
    fn test_continuation_preserved_in_double_string() {
        let tokens = lex("go: echo \"a \\\nb\"");
        let text: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::StringText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(text, vec!["a \\\nb"]);
    }

    #[test]
    fn test_continuation_preserved_in_single_string() {
        let tokens = lex("go: echo 'a \\\nb'");
        let text: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::StringText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(text, vec!["a \\\nb"]);
    }

    #[test]
    fn test_continuation_preserved_in_backtick_string() {
        let tokens = lex("go: echo `a \\\nb`");
        let text: Vec<&str> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::StringText)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(text, vec!["a \\\nb"]);
    }

    #[test]
    fn test_statement_decorator_without_parens() {
        let tokens = lex("par: @parallel {\n  echo a\n}");
        assert_eq!(
            kinds(&tokens)[..5],
            [
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::At,
                TokenType::Identifier,
                TokenType::LBrace,
            ]
        );
    }

    #[test]
    fn test_empty_command_body() {
        let tokens = lex("noop:");
        assert_eq!(kinds(&tokens), vec![TokenType::Identifier, TokenType::Colon, TokenType::Eof]);
    }

    #[test]
    fn test_watch_stop_keywords() {
        let tokens = lex("watch dev: npm start\nstop dev: pkill npm");
        assert_eq!(tokens[0].token_type, TokenType::Watch);
        let stops = tokens.iter().filter(|t| t.token_type == TokenType::Stop).count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_var_group_tokens() {
        let tokens = lex("var (\n  A = 1\n  B = \"two\"\n)");
        assert_eq!(tokens[0].token_type, TokenType::Var);
        assert_eq!(tokens[1].token_type, TokenType::LParen);
        assert!(tokens.iter().any(|t| t.token_type == TokenType::RParen));
        // No shell mode was entered
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::ShellText));
    }
}
