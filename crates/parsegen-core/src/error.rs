//! Error taxonomy for grammar/lexer construction and for a running parse.
//!
//! `ConfigError` and `GrammarConflict` are construction-time; a `ConfigError`
//! aborts construction (`RadlrResult::Err`), while `GrammarConflict`s are
//! collected into a `Vec` returned alongside a successfully built table set.
//! `LexError` and `ParseError` are runtime and are handed to the installed
//! `on_error`/`on_parse_error` hooks rather than aborting outright.

use thiserror::Error;

pub type RadlrResult<T> = Result<T, ConfigError>;

/// Fatal problems detected while building a [`Grammar`](crate::grammar::Grammar),
/// [`Lexer`](crate::lexer::Lexer), or [`ParseTables`](crate::tables::ParseTables).
/// Construction aborts on any of these; none are recoverable at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("duplicate token kind `{0}`")]
  DuplicateTokenKind(String),

  #[error("pattern for token `{0}` matches the empty string")]
  EmptyMatchPattern(String),

  #[error("pattern for token `{kind}` failed to compile: {source}")]
  BadPattern {
    kind:   String,
    #[source]
    source: regex::Error,
  },

  #[error("master pattern exceeds the regex engine's named-group limit ({0} groups)")]
  TooManyGroups(usize),

  #[error("terminal `{0}` used in a production body was never declared")]
  UndeclaredTerminal(String),

  #[error("nonterminal `{0}` is used in a production but never appears as a left-hand side")]
  UndefinedNonterminal(String),

  #[error("nonterminal `{0}` has no production that derives a terminal-bounded string")]
  InfiniteCycle(String),

  #[error("precedence for `{term}` declared after production {production} was already added")]
  PrecedenceDeclaredTooLate { term: String, production: usize },

  #[error("start symbol `{0}` is not the left-hand side of any production")]
  UndefinedStart(String),

  #[error("`%prec {0}` refers to an undeclared terminal")]
  UndeclaredPrecedenceTerm(String),
}

/// A non-fatal diagnostic surfaced from [`tables::build`](crate::tables::build)
/// alongside the (still usable) tables it built.
#[derive(Debug, Clone)]
pub enum GrammarConflict {
  ShiftReduce { state: usize, terminal: String, shift_to: usize, reduce_production: usize, resolved_as_shift: bool },
  ReduceReduce { state: usize, terminal: String, kept_production: usize, dropped_production: usize },
  NonAssocError { state: usize, terminal: String },
}

/// No lexer rule matched at the current cursor position.
#[derive(Debug, Error, Clone)]
#[error("no lexer rule matched at line {line}, offset {offset} (state `{state}`)")]
pub struct LexError {
  pub line:   u32,
  pub offset: usize,
  pub state:  String,
}

/// An ACTION-table lookup miss that error recovery did not absorb.
#[derive(Debug, Error, Clone)]
#[error("syntax error at line {line}, offset {offset}: unexpected `{found}`")]
pub struct ParseError {
  pub line:   u32,
  pub offset: usize,
  pub found:  String,
}

/// A user action callable raised. Boxed so a host's own error type (anyhow,
/// a custom enum, ...) can flow through without this crate naming it; the
/// parsing session is invalidated once this surfaces.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct UserActionError(#[from] pub Box<dyn std::error::Error + Send + Sync + 'static>);

/// The error type surfaced from [`crate::parser::Parser::parse`]: either an
/// ordinary `ParseError`/`LexError` the engine itself detected, or a
/// `UserActionError` an action callable raised, propagated unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error(transparent)]
  Lex(#[from] LexError),
  #[error(transparent)]
  Action(#[from] UserActionError),
}
