use clap::Parser;
use std::io::Read;

use devcmd::parser::Lexer;

#[derive(Parser)]
#[command(name = "devcmd")]
#[command(about = "Parse and inspect devcmd command files")]
#[command(version)]
struct Cli {
    /// Parse the source from a command line argument
    #[arg(short = 'c')]
    source: Option<String>,

    /// Dump the token stream instead of parsing
    #[arg(long = "tokens")]
    tokens: bool,

    /// Print the AST as a debug tree
    #[arg(long = "ast")]
    ast: bool,

    /// Print the AST as JSON
    #[arg(long = "json")]
    json: bool,

    /// Command file to parse
    #[arg()]
    file: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    // Determine source: -c, file, or stdin
    let source = if let Some(s) = cli.source {
        s
    } else if let Some(ref file) = cli.file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("Error: no input. Use -c 'source', provide a file, or pipe via stdin.");
            std::process::exit(1);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    if cli.tokens {
        let (tokens, errors) = Lexer::new(&source).tokenize();
        for token in &tokens {
            println!(
                "{:>4}:{:<4} {:<18} {:?}",
                token.line,
                token.column,
                format!("{:?}", token.token_type),
                token.value
            );
        }
        for err in &errors {
            eprintln!("{err}");
        }
        std::process::exit(if errors.is_empty() { 0 } else { 1 });
    }

    match devcmd::parse(&source) {
        Ok(program) => {
            if cli.json {
                match serde_json::to_string_pretty(&program) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Error: cannot serialize AST: {e}");
                        std::process::exit(1);
                    }
                }
            } else if cli.ast {
                println!("{program:#?}");
            } else {
                print!("{program}");
            }
        }
        Err(errors) => {
            for err in &errors {
                eprint!("{}", err.render());
            }
            eprintln!(
                "{} error{} found",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            );
            std::process::exit(1);
        }
    }
}
