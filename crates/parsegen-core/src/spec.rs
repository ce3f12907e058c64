//! The external interface: the `RuleSet` and `GrammarSpec` input contracts
//! that the reflection/bind layer (out of scope here) is responsible for
//! materializing. Everything in this module is plain data plus opaque
//! callback handles; nothing here inspects a user program.

use crate::error::{LexError, UserActionError};
use crate::regex_assembler::RegexFlags;
use parsegen_runtime::Value;
use std::sync::Arc;

/// One positional argument view handed to a grammar-production action:
/// index 0 is the result slot, indices `1..=len(rhs)` are the popped symbol
/// values, and negative indices peek further left on the stack for
/// mid-rule actions.
pub trait RuleArgs {
  fn result(&mut self) -> &mut Value;
  fn set_result(&mut self, value: Value);
  fn get(&self, index: isize) -> &Value;
  fn line(&self, index: isize) -> u32;
  fn offset(&self, index: isize) -> usize;
  fn len(&self) -> usize;
}

/// The outcome of running a production's action.
pub enum ActionSignal {
  /// Ordinary completion; the result slot (already set via `set_result`, or
  /// defaulted to `Value::None`) becomes the reduced nonterminal's value.
  Done,
  /// The synchronous "syntax error at this point" signal: behaves as though
  /// the most recently shifted symbol triggered a parse failure. The error
  /// handler is *not* invoked for this path.
  SyntaxError,
}

pub type ActionResult = Result<ActionSignal, UserActionError>;

/// A grammar-production action callable ("action handle").
pub type Action = Arc<dyn Fn(&mut dyn RuleArgs) -> ActionResult + Send + Sync>;

/// A lexer-rule action callable. Returning `None` discards the token and
/// continues scanning; returning `Some` emits it (after whatever in-place
/// mutation the closure made to `kind`/`value`).
pub type LexAction = Arc<dyn Fn(&mut LexActionArgs) -> Result<LexActionEffect, UserActionError> + Send + Sync>;

/// Mutable view into the token a lexer-rule action is deciding the fate of,
/// plus the handle needed to drive state transitions / `skip`/`more` from
/// inside the action.
pub struct LexActionArgs<'a> {
  pub kind:  &'a mut String,
  pub value: &'a mut Value,
  pub text:  &'a str,
  pub line:  &'a mut u32,
  pub commands: Vec<LexCommand>,
}

impl<'a> LexActionArgs<'a> {
  pub fn push_state(&mut self, name: impl Into<String>) {
    self.commands.push(LexCommand::Push(name.into()));
  }

  pub fn pop_state(&mut self) {
    self.commands.push(LexCommand::Pop);
  }

  pub fn begin(&mut self, name: impl Into<String>) {
    self.commands.push(LexCommand::Begin(name.into()));
  }

  pub fn skip(&mut self, n: usize) {
    self.commands.push(LexCommand::Skip(n));
  }

  /// Appends `extra` to the input without resetting the cursor or lexer
  /// state -- the action-callable counterpart to feeding more text from an
  /// `on_eof` hook (see [`crate::lexer::Lexer::more`]).
  pub fn more(&mut self, extra: impl Into<String>) {
    self.commands.push(LexCommand::More(extra.into()));
  }
}

#[derive(Clone, Debug)]
pub enum LexCommand {
  Push(String),
  Pop,
  Begin(String),
  Skip(usize),
  More(String),
}

pub enum LexActionEffect {
  Emit,
  Discard,
}

/// Mutable view into a [`LexError`] an installed `on_error` hook is
/// deciding how to recover from. Calling [`LexErrorArgs::skip`] advances
/// the cursor explicitly, the error-hook counterpart of
/// [`LexActionArgs::skip`]; if the hook never calls it, the lexer falls
/// back to advancing exactly one character past the failure point.
pub struct LexErrorArgs<'a> {
  pub error: &'a LexError,
  skip:      Option<usize>,
}

impl<'a> LexErrorArgs<'a> {
  pub fn new(error: &'a LexError) -> Self {
    Self { error, skip: None }
  }

  pub fn skip(&mut self, n: usize) {
    self.skip = Some(self.skip.unwrap_or(0) + n);
  }

  /// How far the hook asked to advance, if it called [`Self::skip`] at all.
  pub fn skipped(&self) -> Option<usize> {
    self.skip
  }
}

/// One lexer rule: a named pattern, optionally restricted to a subset of
/// lexer states, optionally carrying an action.
#[derive(Clone)]
pub struct LexRule {
  pub kind:    String,
  pub pattern: String,
  pub action:  Option<LexAction>,
  /// States this rule is active in. Empty means "every state this rule's
  /// kind wasn't excluded from" is *not* assumed here -- the lexer resolves
  /// state membership explicitly; an empty list means INITIAL only.
  pub states:  Vec<String>,
}

impl std::fmt::Debug for LexRule {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LexRule")
      .field("kind", &self.kind)
      .field("pattern", &self.pattern)
      .field("has_action", &self.action.is_some())
      .field("states", &self.states)
      .finish()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateMode {
  Inclusive,
  Exclusive,
}

#[derive(Clone, Debug)]
pub struct LexerStateDecl {
  pub name: String,
  pub mode: StateMode,
}

/// Input contract consumed by the lexer constructor.
#[derive(Clone, Default)]
pub struct RuleSet {
  pub tokens:   Vec<String>,
  pub literals: Vec<char>,
  pub rules:    Vec<LexRule>,
  /// Characters to skip silently, keyed by state name (`"INITIAL"` for the
  /// default state).
  pub ignore:   Vec<(String, String)>,
  pub states:   Vec<LexerStateDecl>,
  /// `regex::RegexBuilder` flags applied to every compiled pattern in this
  /// rule set. Defaults to verbose mode on (see [`RegexFlags::default`]);
  /// a caller overriding this replaces the whole flag set, so re-include
  /// `verbose: true` explicitly if whitespace-insensitive patterns are
  /// still wanted alongside the override.
  pub flags:    RegexFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assoc {
  Left,
  Right,
  NonAssoc,
}

/// One production entry of the grammar-spec input.
#[derive(Clone)]
pub struct ProductionSpec {
  pub lhs:            String,
  pub rhs:             Vec<String>,
  pub action:          Option<Action>,
  /// `%prec TERM` override.
  pub prec_override:   Option<String>,
  pub source_location: Option<String>,
}

impl std::fmt::Debug for ProductionSpec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProductionSpec")
      .field("lhs", &self.lhs)
      .field("rhs", &self.rhs)
      .field("has_action", &self.action.is_some())
      .field("prec_override", &self.prec_override)
      .finish()
  }
}

/// Input contract consumed by the parser constructor.
#[derive(Clone, Default)]
pub struct GrammarSpec {
  pub tokens:       Vec<String>,
  pub start:        Option<String>,
  /// Lowest-to-highest level order, as in yacc's `%left`/`%right`/`%nonassoc`
  /// declaration order.
  pub precedence:   Vec<(Assoc, Vec<String>)>,
  pub productions:  Vec<ProductionSpec>,
}
