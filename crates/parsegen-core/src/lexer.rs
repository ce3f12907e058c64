//! The lexer runtime.

use crate::{
  error::{LexError, RadlrResult},
  regex_assembler::{build_master_pattern, MasterPattern},
  spec::{LexActionArgs, LexActionEffect, LexCommand, LexErrorArgs, LexRule, RuleSet, StateMode},
};
use parsegen_runtime::{CachedString, IStringStore, Token, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::trace;

pub const INITIAL: &str = "INITIAL";

/// Called with a mutable handle on the error the lexer just hit. The hook
/// may call [`LexErrorArgs::skip`] to take explicit control of how far the
/// cursor advances (mirroring [`LexActionArgs::skip`]); if it never does,
/// `next()` falls back to advancing exactly one character.
pub type OnError = Arc<dyn Fn(&mut LexErrorArgs) + Send + Sync>;
/// Returns replacement/additional input, or `None` to signal true EOF.
pub type OnEof = Arc<dyn Fn() -> Option<String> + Send + Sync>;

struct LexerTables {
  patterns:     FxHashMap<String, MasterPattern>,
  state_modes:  FxHashMap<String, StateMode>,
  ignore:       FxHashMap<String, FxHashSet<char>>,
  actions:      FxHashMap<String, crate::spec::LexAction>,
  store:        IStringStore,
}

/// The lexer runtime. Built once from a [`RuleSet`]; the compiled master
/// patterns are immutable and shared (via `Arc`) across every clone, so
/// multiple sessions may share them read-only. The `on_error`/`on_eof`
/// hooks live outside that `Arc` because they are cheap `Arc<dyn Fn>`
/// clones in their own right and a clone sharing them is the "shared user
/// state" limitation documented on `clone()`.
#[derive(Clone)]
pub struct Lexer {
  tables:      Arc<LexerTables>,
  on_error:    Option<OnError>,
  on_eof:      Option<OnEof>,
  input:       String,
  cursor:      usize,
  line:        u32,
  state_stack: Vec<String>,
}

impl Lexer {
  pub fn new(rules: RuleSet, store: IStringStore) -> RadlrResult<Self> {
    let mut state_modes = FxHashMap::default();
    state_modes.insert(INITIAL.to_string(), StateMode::Inclusive);
    for decl in &rules.states {
      state_modes.insert(decl.name.clone(), decl.mode);
    }

    let mut patterns = FxHashMap::default();
    for (state, mode) in state_modes.clone() {
      let mut applicable: Vec<&LexRule> =
        rules.rules.iter().filter(|r| rule_active_in(r, &state, mode == StateMode::Inclusive)).collect();
      applicable.dedup_by_key(|r| r.kind.clone());
      let pattern =
        build_master_pattern(&applicable, if state == INITIAL { &rules.literals } else { &[] }, rules.flags)?;
      patterns.insert(state, pattern);
    }

    let mut ignore = FxHashMap::default();
    for (state, chars) in &rules.ignore {
      ignore.insert(state.clone(), chars.chars().collect());
    }

    let mut actions = FxHashMap::default();
    for rule in &rules.rules {
      if let Some(action) = &rule.action {
        actions.insert(rule.kind.clone(), action.clone());
      }
    }

    Ok(Self {
      tables: Arc::new(LexerTables { patterns, state_modes, ignore, actions, store }),
      on_error: None,
      on_eof: None,
      input: String::new(),
      cursor: 0,
      line: 1,
      state_stack: vec![INITIAL.to_string()],
    })
  }

  pub fn with_error_hook(mut self, hook: OnError) -> Self {
    self.on_error = Some(hook);
    self
  }

  pub fn with_eof_hook(mut self, hook: OnEof) -> Self {
    self.on_eof = Some(hook);
    self
  }

  /// Resets position to 0, stores the input, clears the state stack to
  /// `INITIAL`.
  pub fn feed(&mut self, input: impl Into<String>) {
    self.input = input.into();
    self.cursor = 0;
    self.line = 1;
    self.state_stack = vec![INITIAL.to_string()];
  }

  /// Append more input without resetting cursor/state; also used
  /// internally by the EOF hook path. Line numbers are *not* reset when
  /// new input arrives this way.
  pub fn more(&mut self, input: &str) {
    self.input.push_str(input);
  }

  /// Advance the cursor by `n` input units without producing a token.
  pub fn skip(&mut self, n: usize) {
    self.cursor = (self.cursor + n).min(self.input.len());
  }

  pub fn push_state(&mut self, name: impl Into<String>) {
    self.state_stack.push(name.into());
  }

  pub fn pop_state(&mut self) {
    if self.state_stack.len() > 1 {
      self.state_stack.pop();
    }
  }

  /// Replace the current (top) state.
  pub fn begin(&mut self, name: impl Into<String>) {
    if let Some(top) = self.state_stack.last_mut() {
      *top = name.into();
    } else {
      self.state_stack.push(name.into());
    }
  }

  pub fn current_state(&self) -> &str {
    self.state_stack.last().map(|s| s.as_str()).unwrap_or(INITIAL)
  }

  pub fn line(&self) -> u32 {
    self.line
  }

  pub fn offset(&self) -> usize {
    self.cursor
  }

  pub fn set_line(&mut self, line: u32) {
    self.line = line;
  }

  pub fn string_store(&self) -> &IStringStore {
    &self.tables.store
  }

  pub fn at_eof(&self) -> bool {
    self.cursor >= self.input.len()
  }

  /// Returns the next token, or `None` on EOF (after the optional EOF hook
  /// declines to provide more input).
  pub fn next(&mut self) -> Result<Option<Token>, LexError> {
    loop {
      if self.cursor >= self.input.len() {
        match self.on_eof.clone() {
          Some(hook) => match hook() {
            Some(more) if !more.is_empty() => {
              self.more(&more);
              continue;
            }
            _ => return Ok(None),
          },
          None => return Ok(None),
        }
      }

      self.consume_ignored();

      if self.cursor >= self.input.len() {
        continue;
      }

      let state = self.current_state().to_string();
      let pattern = self.tables.patterns.get(&state).expect("every reachable state has a compiled pattern");
      let remaining = &self.input[self.cursor..];

      match pattern.match_at(remaining) {
        None => {
          let err = LexError { line: self.line, offset: self.cursor, state: state.clone() };
          let requested_skip = self.on_error.clone().and_then(|hook| {
            let mut args = LexErrorArgs::new(&err);
            hook(&mut args);
            args.skipped()
          });
          match requested_skip {
            Some(n) => self.skip(n),
            None => {
              let advance = remaining.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
              self.cursor += advance;
            }
          }
          continue;
        }
        Some((kind, len)) => {
          let lexeme = remaining[..len].to_string();
          let mut token = Token {
            kind: kind.to_token(&self.tables.store),
            value: Value::None,
            lexeme,
            line: self.line,
            offset: self.cursor,
            end_offset: self.cursor + len,
          };
          self.cursor += len;

          let Some(action) = self.tables.actions.get(kind).cloned() else {
            trace!(kind, "lexed token (no action)");
            return Ok(Some(token));
          };

          let mut kind_buf = kind.to_string();
          let mut line_buf = self.line;
          let mut args = LexActionArgs {
            kind: &mut kind_buf,
            value: &mut token.value,
            text: &token.lexeme,
            line: &mut line_buf,
            commands: Vec::new(),
          };
          let effect = match action(&mut args) {
            Ok(effect) => effect,
            Err(_user_err) => {
              // A lexer action reporting failure through its `Result` still
              // has to leave the lexer in a well-defined state; surface it
              // to the caller as a lex error rather than unwinding here.
              let err = LexError { line: self.line, offset: token.offset, state: state.clone() };
              if let Some(hook) = self.on_error.clone() {
                let mut args = LexErrorArgs::new(&err);
                hook(&mut args);
                if let Some(n) = args.skipped() {
                  self.skip(n);
                }
              }
              continue;
            }
          };
          let commands = std::mem::take(&mut args.commands);
          self.line = line_buf;
          for cmd in commands {
            match cmd {
              LexCommand::Push(name) => self.push_state(name),
              LexCommand::Pop => self.pop_state(),
              LexCommand::Begin(name) => self.begin(name),
              LexCommand::Skip(n) => self.skip(n),
              LexCommand::More(extra) => self.more(&extra),
            }
          }
          token.kind = kind_buf.to_token(&self.tables.store);
          match effect {
            LexActionEffect::Emit => return Ok(Some(token)),
            LexActionEffect::Discard => continue,
          }
        }
      }
    }
  }

  fn consume_ignored(&mut self) {
    let Some(ignored) = self.tables.ignore.get(self.current_state()) else { return };
    if ignored.is_empty() {
      return;
    }
    let bytes_consumed: usize = self.input[self.cursor..]
      .chars()
      .take_while(|c| ignored.contains(c))
      .map(|c| c.len_utf8())
      .sum();
    self.cursor += bytes_consumed;
  }
}

fn rule_active_in(rule: &LexRule, state: &str, inclusive_fallback: bool) -> bool {
  if rule.states.is_empty() {
    return state == INITIAL || inclusive_fallback;
  }
  rule.states.iter().any(|s| s == state) || (inclusive_fallback && rule.states.iter().any(|s| s == INITIAL))
}
