//! Canonical source rendering for AST nodes
//!
//! Every node renders back to canonical devcmd source. Reparsing the
//! rendered form yields an equivalent AST, which the round-trip tests rely
//! on. Sugar forms are preferred where they exist: a single-item body is
//! printed without braces.

use std::fmt;

use crate::ast::types::{
    BlockDecorator, BranchPattern, ChainOperator, CommandContent, CommandDecl, CommandKind,
    DecoratorCall, Expression, NamedArg, PatternBranch, PatternDecorator, Program, QuoteStyle,
    ShellChain, ShellContent, ShellPart, StringLit, StringPiece, VarDecl, VarGroup,
};

const INDENT: &str = "  ";

fn write_indent(f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
    for _ in 0..level {
        f.write_str(INDENT)?;
    }
    Ok(())
}

fn escape_into(text: &str, style: QuoteStyle, out: &mut String) {
    let quote = style.quote_char();
    for c in text.chars() {
        if style.interpolates() && (c == quote || c == '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for var in &self.variables {
            first = false;
            writeln!(f, "{var}")?;
        }
        for group in &self.var_groups {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "{group}")?;
        }
        for command in &self.commands {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "{command}")?;
        }
        Ok(())
    }
}

impl fmt::Display for VarDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var {} = {}", self.name, self.value)
    }
}

impl fmt::Display for VarGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "var (")?;
        for var in &self.variables {
            writeln!(f, "{INDENT}{} = {}", var.name, var.value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CommandDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CommandKind::Command => {}
            CommandKind::Watch => f.write_str("watch ")?,
            CommandKind::Stop => f.write_str("stop ")?,
        }
        write!(f, "{}:", self.name)?;
        match self.body.as_slice() {
            [] => Ok(()),
            [single] => {
                f.write_str(" ")?;
                write_content(f, single, 0)
            }
            body => {
                f.write_str(" {\n")?;
                for item in body {
                    write_indent(f, 1)?;
                    write_content(f, item, 1)?;
                    writeln!(f)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_content(f: &mut fmt::Formatter<'_>, content: &CommandContent, level: usize) -> fmt::Result {
    match content {
        CommandContent::Shell(shell) => write!(f, "{shell}"),
        CommandContent::Chain(chain) => write!(f, "{chain}"),
        CommandContent::Action(call) => write!(f, "{call}"),
        CommandContent::Block(block) => write_block(f, block, level),
        CommandContent::Pattern(pattern) => write_pattern(f, pattern, level),
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &BlockDecorator, level: usize) -> fmt::Result {
    write_decorator_header(f, &block.name, &block.args)?;
    f.write_str(" {\n")?;
    for item in &block.content {
        write_indent(f, level + 1)?;
        write_content(f, item, level + 1)?;
        writeln!(f)?;
    }
    write_indent(f, level)?;
    f.write_str("}")
}

fn write_pattern(
    f: &mut fmt::Formatter<'_>,
    pattern: &PatternDecorator,
    level: usize,
) -> fmt::Result {
    write_decorator_header(f, &pattern.name, &pattern.args)?;
    f.write_str(" {\n")?;
    for branch in &pattern.patterns {
        write_indent(f, level + 1)?;
        write_branch(f, branch, level + 1)?;
        writeln!(f)?;
    }
    write_indent(f, level)?;
    f.write_str("}")
}

fn write_branch(f: &mut fmt::Formatter<'_>, branch: &PatternBranch, level: usize) -> fmt::Result {
    write!(f, "{}:", branch.pattern)?;
    match branch.commands.as_slice() {
        [] => Ok(()),
        [single] => {
            f.write_str(" ")?;
            write_content(f, single, level)
        }
        commands => {
            f.write_str(" {\n")?;
            for item in commands {
                write_indent(f, level + 1)?;
                write_content(f, item, level + 1)?;
                writeln!(f)?;
            }
            write_indent(f, level)?;
            f.write_str("}")
        }
    }
}

fn write_decorator_header(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    args: &[NamedArg],
) -> fmt::Result {
    write!(f, "@{name}")?;
    if !args.is_empty() {
        f.write_str("(")?;
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;
    }
    Ok(())
}

impl fmt::Display for BranchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ShellContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ShellChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", element.content)?;
            if element.operator != ChainOperator::None {
                write!(f, " {}", element.operator.as_str())?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ShellPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellPart::Text(text) => f.write_str(text),
            ShellPart::StringLit(lit) => write!(f, "{lit}"),
            ShellPart::ValueDecorator(call) | ShellPart::ActionDecorator(call) => {
                write!(f, "{call}")
            }
        }
    }
}

impl fmt::Display for StringLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = self.style.quote_char();
        let mut body = String::new();
        for piece in &self.pieces {
            match piece {
                StringPiece::Text(text) => escape_into(text, self.style, &mut body),
                StringPiece::Decorator(call) => body.push_str(&call.to_string()),
            }
        }
        write!(f, "{quote}{body}{quote}")
    }
}

impl fmt::Display for DecoratorCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_decorator_header(f, &self.name, &self.args)
    }
}

impl fmt::Display for NamedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::String(text) => {
                let mut body = String::new();
                escape_into(text, QuoteStyle::Double, &mut body);
                write!(f, "\"{body}\"")
            }
            Expression::Number(raw) | Expression::Duration(raw) => f.write_str(raw),
            Expression::Boolean(value) => write!(f, "{value}"),
            Expression::Identifier(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::*;

    #[test]
    fn test_var_decl_display() {
        let var = VarDecl {
            name: "PORT".into(),
            value: Expression::Number("8080".into()),
            line: 1,
        };
        assert_eq!(var.to_string(), "var PORT = 8080");
    }

    #[test]
    fn test_string_expression_escapes_quotes() {
        let expr = Expression::String("say \"hi\"".into());
        assert_eq!(expr.to_string(), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_simple_command_display() {
        let cmd = CommandDecl {
            kind: CommandKind::Command,
            name: "build".into(),
            body: vec![CommandContent::Shell(ShellContent::text("echo hello"))],
            line: 1,
        };
        assert_eq!(cmd.to_string(), "build: echo hello");
    }

    #[test]
    fn test_watch_command_display() {
        let cmd = CommandDecl {
            kind: CommandKind::Watch,
            name: "dev".into(),
            body: vec![CommandContent::Shell(ShellContent::text("npm start"))],
            line: 1,
        };
        assert_eq!(cmd.to_string(), "watch dev: npm start");
    }

    #[test]
    fn test_chain_display() {
        let chain = ShellChain {
            elements: vec![
                ChainElement {
                    content: ShellContent::text("cat f"),
                    operator: ChainOperator::Pipe,
                    target: None,
                },
                ChainElement {
                    content: ShellContent::text("sort"),
                    operator: ChainOperator::None,
                    target: None,
                },
            ],
        };
        assert_eq!(chain.to_string(), "cat f | sort");
    }

    #[test]
    fn test_block_decorator_display() {
        let cmd = CommandDecl {
            kind: CommandKind::Command,
            name: "deploy".into(),
            body: vec![CommandContent::Block(BlockDecorator {
                name: "timeout".into(),
                args: vec![NamedArg {
                    name: "duration".into(),
                    value: Expression::Duration("30s".into()),
                }],
                content: vec![CommandContent::Shell(ShellContent::text("npm run deploy"))],
            })],
            line: 1,
        };
        assert_eq!(
            cmd.to_string(),
            "deploy: @timeout(duration = 30s) {\n  npm run deploy\n}"
        );
    }

    #[test]
    fn test_pattern_decorator_display() {
        let cmd = CommandDecl {
            kind: CommandKind::Command,
            name: "deploy".into(),
            body: vec![CommandContent::Pattern(PatternDecorator {
                name: "when".into(),
                args: vec![NamedArg {
                    name: "variable".into(),
                    value: Expression::Identifier("ENV".into()),
                }],
                patterns: vec![
                    PatternBranch {
                        pattern: BranchPattern::Identifier("prod".into()),
                        commands: vec![CommandContent::Shell(ShellContent::text("echo p"))],
                    },
                    PatternBranch {
                        pattern: BranchPattern::Wildcard,
                        commands: vec![CommandContent::Shell(ShellContent::text("echo ?"))],
                    },
                ],
            })],
            line: 1,
        };
        assert_eq!(
            cmd.to_string(),
            "deploy: @when(variable = ENV) {\n  prod: echo p\n  default: echo ?\n}"
        );
    }

    #[test]
    fn test_interpolated_string_display() {
        let shell = ShellContent {
            parts: vec![
                ShellPart::Text("echo ".into()),
                ShellPart::StringLit(StringLit {
                    style: QuoteStyle::Double,
                    pieces: vec![
                        StringPiece::Text("Hello ".into()),
                        StringPiece::Decorator(DecoratorCall {
                            name: "var".into(),
                            args: vec![NamedArg {
                                name: "name".into(),
                                value: Expression::Identifier("NAME".into()),
                            }],
                        }),
                        StringPiece::Text("!".into()),
                    ],
                }),
            ],
        };
        assert_eq!(shell.to_string(), "echo \"Hello @var(name = NAME)!\"");
    }

    #[test]
    fn test_empty_body_display() {
        let cmd = CommandDecl {
            kind: CommandKind::Command,
            name: "noop".into(),
            body: vec![],
            line: 1,
        };
        assert_eq!(cmd.to_string(), "noop:");
    }
}
