//! A thin driver over `parsegen_core`: builds the bundled arithmetic demo
//! grammar (a hand-built reflection layer for demo purposes only, see
//! `demo.rs`), then either prints its LALR(1) tables dump or runs a
//! line-oriented REPL that lexes and parses each line of stdin.

mod demo;

use clap::{Parser as ClapParser, Subcommand};
use parsegen_core::{write_tables_dump, Parser, RecoveryDirective};
use std::{
  io::{self, BufRead, Write},
  sync::Arc,
};

#[derive(ClapParser)]
#[command(name = "parsegen", version, about = "Demo driver for the bundled arithmetic grammar")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Build the demo grammar's LALR(1) tables and print the tables dump.
  Dump,
  /// Parse arithmetic expressions: one from `--expr`, or one per stdin line.
  Parse {
    #[arg(short, long)]
    expr: Option<String>,
  },
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init().ok();

  let cli = Cli::parse();
  match cli.command {
    Command::Dump => run_dump(),
    Command::Parse { expr } => run_parse(expr),
  }
}

fn run_dump() -> anyhow::Result<()> {
  let demo = demo::build()?;
  let mut out = String::new();
  write_tables_dump(&demo.grammar, &demo.items, &demo.tables, &demo.conflicts, &mut out)?;
  print!("{out}");
  Ok(())
}

fn run_parse(expr: Option<String>) -> anyhow::Result<()> {
  let demo = demo::build()?;
  let grammar = Arc::new(demo.grammar);
  let tables = Arc::new(demo.tables);
  let mut lexer = demo::build_lexer(demo.store)?;

  if let Some(expr) = expr {
    evaluate_line(&mut lexer, &grammar, &tables, &expr);
    return Ok(());
  }

  let stdin = io::stdin();
  print!("> ");
  io::stdout().flush().ok();
  for line in stdin.lock().lines() {
    let line = line?;
    if !line.trim().is_empty() {
      evaluate_line(&mut lexer, &grammar, &tables, &line);
    }
    print!("> ");
    io::stdout().flush().ok();
  }
  println!();
  Ok(())
}

/// One REPL turn: `feed` resets the lexer's cursor/state stack, so the
/// same lexer is reused across lines rather than rebuilt.
fn evaluate_line(
  lexer: &mut parsegen_core::Lexer,
  grammar: &Arc<parsegen_core::Grammar>,
  tables: &Arc<parsegen_core::ParseTables>,
  line: &str,
) {
  lexer.feed(line);
  let mut parser = Parser::new(grammar.clone(), tables.clone()).with_error_hook(Arc::new(|tok| {
    match tok {
      Some(t) => eprintln!("syntax error near line {}, offset {}", t.line, t.offset),
      None => eprintln!("syntax error at end of input"),
    }
    None::<RecoveryDirective>
  }));
  match parser.parse(|| lexer.next()) {
    Ok(value) => println!("{}", value.as_int().map(|i| i.to_string()).unwrap_or_else(|| format!("{value:?}"))),
    Err(e) => eprintln!("error: {e}"),
  }
}
