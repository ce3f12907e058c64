//! The grammar model.
//!
//! A [`GrammarBuilder`] accumulates terminals, precedence declarations, and
//! productions exactly as the reflection/bind layer reports them, then
//! [`GrammarBuilder::build`] freezes everything into a read-only [`Grammar`]
//! -- validating the grammar's structural invariants and computing FIRST
//! sets along the way. Once frozen, a `Grammar` never mutates; the LR-item
//! graph and the LALR table builder both borrow it read-only, sharing it
//! immutably across a table builder and multiple parser sessions.

use crate::{
  error::{ConfigError, RadlrResult},
  spec::Assoc,
  symbol::Symbol,
};
use indexmap::IndexSet;
use parsegen_runtime::{CachedString, IString, IStringStore};
use rustc_hash::{FxHashMap, FxHashSet};

/// The synthetic start nonterminal's name: production 0 is always the
/// augmented start rule `S' → start`. Not a name a user grammar can declare
/// (it is not valid as a bare identifier in any reflection-layer source),
/// so collision with a user nonterminal is not a concern in practice.
pub const AUGMENTED_START: &str = "$S'";

#[derive(Clone, Copy, Debug)]
pub struct Precedence {
  pub assoc: Assoc,
  pub level: u32,
}

/// A single grammar production.
#[derive(Clone)]
pub struct Production {
  pub number:          usize,
  pub lhs:             IString,
  pub rhs:             Vec<Symbol>,
  pub action:          Option<crate::spec::Action>,
  pub precedence:      Option<Precedence>,
  pub source_location: Option<String>,
}

impl std::fmt::Debug for Production {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Production")
      .field("number", &self.number)
      .field("lhs", &self.lhs)
      .field("rhs_len", &self.rhs.len())
      .field("precedence", &self.precedence.map(|p| p.level))
      .finish()
  }
}

/// Builds up a [`Grammar`] one declaration at a time: `declare_terminal`,
/// `set_precedence` (which must come before any `add_production`),
/// `add_production`, then an optional `set_start`.
pub struct GrammarBuilder {
  store:               IStringStore,
  terminals:           IndexSet<IString>,
  nonterminals:        FxHashSet<IString>,
  precedence:          FxHashMap<IString, Precedence>,
  next_level:          u32,
  productions:         Vec<Production>,
  start:               Option<IString>,
  productions_started: bool,
}

impl GrammarBuilder {
  pub fn new(store: IStringStore) -> Self {
    Self {
      store,
      terminals: IndexSet::new(),
      nonterminals: FxHashSet::default(),
      precedence: FxHashMap::default(),
      next_level: 1,
      productions: Vec::new(),
      start: None,
      productions_started: false,
    }
  }

  pub fn declare_terminal(&mut self, name: &str) -> IString {
    let sym = name.to_token(&self.store);
    self.terminals.insert(sym);
    sym
  }

  /// Must precede any `add_production`. Each call bumps an internal level
  /// counter, so repeated calls with the same `assoc` still get distinct,
  /// increasing levels unless the caller passes an explicit `level`. This
  /// mirrors how the reflection layer expands a `precedence: [(assoc,
  /// [term, ...])]` list (lowest to highest) into a series of
  /// `set_precedence` calls sharing one level per group.
  pub fn set_precedence(&mut self, term: &str, assoc: Assoc, level: u32) -> RadlrResult<()> {
    if self.productions_started {
      return Err(ConfigError::PrecedenceDeclaredTooLate {
        term:       term.to_string(),
        production: self.productions.len(),
      });
    }
    let sym = self.declare_terminal(term);
    self.precedence.insert(sym, Precedence { assoc, level });
    self.next_level = self.next_level.max(level + 1);
    Ok(())
  }

  /// Convenience used by the reflection layer for a `%left`/`%right`/
  /// `%nonassoc` group: every term in `terms` gets the same, auto-assigned
  /// level, one higher than the previous group's.
  pub fn set_precedence_group(&mut self, assoc: Assoc, terms: &[&str]) -> RadlrResult<()> {
    let level = self.next_level;
    for term in terms {
      self.set_precedence(term, assoc, level)?;
    }
    Ok(())
  }

  /// `rhs` may reference terminals not yet declared via `declare_terminal`
  /// -- undeclared-terminal use is only an error at `build()` if the name
  /// was never declared by the time the grammar is frozen (every terminal
  /// in any rhs must be declared by then).
  pub fn add_production(
    &mut self,
    lhs: &str,
    rhs: Vec<Symbol>,
    action: Option<crate::spec::Action>,
    prec_override: Option<&str>,
    source_location: Option<String>,
  ) -> RadlrResult<usize> {
    self.productions_started = true;
    let lhs_sym = lhs.to_token(&self.store);
    self.nonterminals.insert(lhs_sym);
    if self.start.is_none() {
      self.start = Some(lhs_sym);
    }

    let precedence = match prec_override {
      Some(term) => {
        let sym = term.to_token(&self.store);
        Some(*self.precedence.get(&sym).ok_or_else(|| ConfigError::UndeclaredPrecedenceTerm(term.to_string()))?)
      }
      None => rightmost_terminal_precedence(&rhs, &self.precedence),
    };

    let number = self.productions.len() + 1; // production 0 is the synthetic augmented start.
    self.productions.push(Production { number, lhs: lhs_sym, rhs, action, precedence, source_location });
    Ok(number)
  }

  pub fn set_start(&mut self, nt: &str) {
    self.start = Some(nt.to_token(&self.store));
  }

  /// Freezes the builder into a [`Grammar`], applying its structural
  /// invariants. Returns the first violated invariant as a [`ConfigError`];
  /// callers that want every undefined-symbol/cycle diagnostic at once
  /// should call [`Grammar::undefined_symbols`] / [`Grammar::infinite_cycles`]
  /// against a grammar built with `build_permissive` instead (used by
  /// tooling that wants to report everything in one pass).
  pub fn build(self) -> RadlrResult<Grammar> {
    let start = self.start.ok_or_else(|| ConfigError::UndefinedStart(String::new()))?;
    if !self.nonterminals.contains(&start) {
      return Err(ConfigError::UndefinedStart(start.to_string(&self.store)));
    }

    let mut grammar = self.into_unvalidated_grammar(start);

    if let Some(bad) = grammar.first_undeclared_terminal() {
      return Err(ConfigError::UndeclaredTerminal(bad));
    }
    if let Some(bad) = grammar.first_undefined_nonterminal() {
      return Err(ConfigError::UndefinedNonterminal(bad));
    }
    for cyclical in grammar.infinite_cycles() {
      return Err(ConfigError::InfiniteCycle(cyclical.to_string(&grammar.store)));
    }

    grammar.compute_first();
    Ok(grammar)
  }

  fn into_unvalidated_grammar(self, start: IString) -> Grammar {
    let augmented_start = AUGMENTED_START.to_token(&self.store);
    let mut productions = self.productions;
    for p in &mut productions {
      p.number += 1;
    }
    productions.insert(0, Production {
      number:          0,
      lhs:             augmented_start,
      rhs:             vec![Symbol::NonTerminal(start)],
      action:          None,
      precedence:      None,
      source_location: None,
    });

    Grammar {
      store: self.store,
      terminals: self.terminals,
      nonterminals: self.nonterminals,
      precedence: self.precedence,
      productions,
      start,
      augmented_start,
      first_sets: FxHashMap::default(),
      nullable: FxHashSet::default(),
    }
  }
}

fn rightmost_terminal_precedence(rhs: &[Symbol], precedence: &FxHashMap<IString, Precedence>) -> Option<Precedence> {
  rhs.iter().rev().find_map(|s| match s {
    Symbol::Terminal(name) => precedence.get(name).copied(),
    Symbol::NonTerminal(_) => None,
  })
}

/// A frozen grammar. Immutable; safe to share read-only (`Arc`-wrapped by
/// callers) across a table builder and multiple parser sessions.
#[derive(Clone)]
pub struct Grammar {
  pub store:        IStringStore,
  pub terminals:    IndexSet<IString>,
  pub nonterminals: FxHashSet<IString>,
  pub precedence:   FxHashMap<IString, Precedence>,
  /// Production 0 is always the synthetic `$S' → start`.
  pub productions:  Vec<Production>,
  pub start:        IString,
  pub augmented_start: IString,
  first_sets:       FxHashMap<IString, FxHashSet<IString>>,
  nullable:         FxHashSet<IString>,
}

impl Grammar {
  pub fn production(&self, number: usize) -> &Production {
    &self.productions[number]
  }

  pub fn productions_of(&self, nonterm: IString) -> impl Iterator<Item = &Production> {
    self.productions.iter().filter(move |p| p.lhs == nonterm)
  }

  pub fn is_nullable(&self, nt: IString) -> bool {
    self.nullable.contains(&nt)
  }

  pub fn first_of(&self, nt: IString) -> &FxHashSet<IString> {
    static EMPTY: std::sync::OnceLock<FxHashSet<IString>> = std::sync::OnceLock::new();
    self.first_sets.get(&nt).unwrap_or_else(|| EMPTY.get_or_init(FxHashSet::default))
  }

  /// FIRST of a symbol *sequence*, plus whether the whole sequence is
  /// nullable -- shared plumbing between `compute_first` and the LALR
  /// lookahead-propagation closure step.
  pub fn first_of_sequence(&self, symbols: &[Symbol]) -> (FxHashSet<IString>, bool) {
    let mut out = FxHashSet::default();
    for sym in symbols {
      match sym {
        Symbol::Terminal(t) => {
          out.insert(*t);
          return (out, false);
        }
        Symbol::NonTerminal(nt) => {
          out.extend(self.first_of(*nt).iter().copied());
          if !self.is_nullable(*nt) {
            return (out, false);
          }
        }
      }
    }
    (out, true)
  }

  /// Standard FIRST computation with ε; iterates to fixpoint.
  fn compute_first(&mut self) {
    let mut nullable: FxHashSet<IString> = FxHashSet::default();
    let mut first: FxHashMap<IString, FxHashSet<IString>> =
      self.nonterminals.iter().map(|nt| (*nt, FxHashSet::default())).collect();

    loop {
      let mut changed = false;
      for p in &self.productions {
        if p.rhs.is_empty() {
          changed |= nullable.insert(p.lhs);
          continue;
        }
        let mut seq_nullable = true;
        for sym in &p.rhs {
          match sym {
            Symbol::Terminal(t) => {
              let entry = first.entry(p.lhs).or_default();
              changed |= entry.insert(*t);
              seq_nullable = false;
              break;
            }
            Symbol::NonTerminal(nt) => {
              let addition: Vec<IString> = first.get(nt).map(|s| s.iter().copied().collect()).unwrap_or_default();
              let entry = first.entry(p.lhs).or_default();
              for t in addition {
                changed |= entry.insert(t);
              }
              if !nullable.contains(nt) {
                seq_nullable = false;
                break;
              }
            }
          }
        }
        if seq_nullable {
          changed |= nullable.insert(p.lhs);
        }
      }
      if !changed {
        break;
      }
    }

    self.first_sets = first;
    self.nullable = nullable;
  }

  /// The first rhs terminal referenced but never declared via
  /// `declare_terminal`.
  fn first_undeclared_terminal(&self) -> Option<String> {
    for p in &self.productions {
      for sym in &p.rhs {
        if let Symbol::Terminal(t) = sym {
          if !self.terminals.contains(t) {
            return Some(t.to_string(&self.store));
          }
        }
      }
    }
    None
  }

  /// A nonterminal used in some rhs that never appears as an lhs.
  fn first_undefined_nonterminal(&self) -> Option<String> {
    for p in &self.productions {
      for sym in &p.rhs {
        if let Symbol::NonTerminal(nt) = sym {
          if !self.nonterminals.contains(nt) {
            return Some(nt.to_string(&self.store));
          }
        }
      }
    }
    None
  }

  /// Both halves of `undefined_symbols()`, returned together for tooling
  /// that wants every diagnostic rather than the first.
  pub fn undefined_symbols(&self) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    for p in &self.productions {
      for sym in &p.rhs {
        match sym {
          Symbol::Terminal(t) if !self.terminals.contains(t) && seen.insert(*t) => {
            out.push(format!("undeclared terminal `{}`", t.to_string(&self.store)))
          }
          Symbol::NonTerminal(nt) if !self.nonterminals.contains(nt) && seen.insert(*nt) => {
            out.push(format!("undefined nonterminal `{}`", nt.to_string(&self.store)))
          }
          _ => {}
        }
      }
    }
    out
  }

  /// Nonterminals never reached by a BFS of productions starting from the
  /// start symbol.
  pub fn unreachable(&self) -> Vec<IString> {
    let mut reached: FxHashSet<IString> = FxHashSet::default();
    let mut stack = vec![self.start];
    reached.insert(self.start);
    while let Some(nt) = stack.pop() {
      for p in self.productions_of(nt) {
        for sym in &p.rhs {
          if let Symbol::NonTerminal(next) = sym {
            if reached.insert(*next) {
              stack.push(*next);
            }
          }
        }
      }
    }
    self.nonterminals.iter().filter(|nt| !reached.contains(*nt)).copied().collect()
  }

  /// A nonterminal with no production that derives a finite,
  /// terminal-bounded string. Computed as the complement of the fixpoint
  /// set of "terminable" nonterminals.
  pub fn infinite_cycles(&self) -> Vec<IString> {
    let mut terminable: FxHashSet<IString> = FxHashSet::default();
    loop {
      let mut changed = false;
      for p in &self.productions {
        if terminable.contains(&p.lhs) {
          continue;
        }
        let all_ok = p.rhs.iter().all(|s| match s {
          Symbol::Terminal(_) => true,
          Symbol::NonTerminal(nt) => terminable.contains(nt),
        });
        if all_ok {
          terminable.insert(p.lhs);
          changed = true;
        }
      }
      if !changed {
        break;
      }
    }
    self.nonterminals.iter().filter(|nt| !terminable.contains(*nt)).copied().collect()
  }

  /// Declared terminals that never appear in any production's rhs.
  pub fn unused_terminals(&self) -> Vec<IString> {
    let used: FxHashSet<IString> = self
      .productions
      .iter()
      .flat_map(|p| p.rhs.iter())
      .filter_map(|s| if let Symbol::Terminal(t) = s { Some(*t) } else { None })
      .collect();
    self.terminals.iter().filter(|t| !used.contains(*t)).copied().collect()
  }

  /// Terminals with a declared precedence entry that never appear in any
  /// production's rhs, so the precedence can never participate in conflict
  /// resolution.
  pub fn unused_precedence(&self) -> Vec<IString> {
    let unused = self.unused_terminals();
    self.precedence.keys().filter(|t| unused.contains(t)).copied().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Symbol;

  fn term(store: &IStringStore, name: &str) -> Symbol {
    Symbol::Terminal(name.to_token(store))
  }
  fn nt(store: &IStringStore, name: &str) -> Symbol {
    Symbol::NonTerminal(name.to_token(store))
  }

  fn expr_grammar(store: &IStringStore) -> GrammarBuilder {
    let mut g = GrammarBuilder::new(store.clone());
    for t in ["PLUS", "TIMES", "NUM", "LPAREN", "RPAREN"] {
      g.declare_terminal(t);
    }
    g.add_production("E", vec![nt(store, "E"), term(store, "PLUS"), nt(store, "T")], None, None, None).unwrap();
    g.add_production("E", vec![nt(store, "T")], None, None, None).unwrap();
    g.add_production("T", vec![nt(store, "T"), term(store, "TIMES"), nt(store, "F")], None, None, None).unwrap();
    g.add_production("T", vec![nt(store, "F")], None, None, None).unwrap();
    g.add_production("F", vec![term(store, "NUM")], None, None, None).unwrap();
    g.add_production("F", vec![term(store, "LPAREN"), nt(store, "E"), term(store, "RPAREN")], None, None, None)
      .unwrap();
    g
  }

  #[test]
  fn builds_augmented_start_production_zero() {
    let store = IStringStore::new();
    let grammar = expr_grammar(&store).build().unwrap();
    assert_eq!(grammar.production(0).lhs.to_string(&store), AUGMENTED_START);
    assert_eq!(grammar.production(0).rhs, vec![Symbol::NonTerminal(grammar.start)]);
    assert_eq!(grammar.production(1).number, 1);
  }

  #[test]
  fn first_of_nonterminal_reaches_leaf_terminals() {
    let store = IStringStore::new();
    let grammar = expr_grammar(&store).build().unwrap();
    let e = "E".to_token(&store);
    let firsts: FxHashSet<String> = grammar.first_of(e).iter().map(|s| s.to_string(&store)).collect();
    assert_eq!(firsts, ["NUM", "LPAREN"].into_iter().map(String::from).collect());
  }

  #[test]
  fn rejects_undeclared_terminal() {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.add_production("S", vec![term(&store, "X")], None, None, None).unwrap();
    assert!(matches!(g.build(), Err(ConfigError::UndeclaredTerminal(_))));
  }

  #[test]
  fn rejects_undefined_nonterminal() {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.add_production("S", vec![nt(&store, "Missing")], None, None, None).unwrap();
    assert!(matches!(g.build(), Err(ConfigError::UndefinedNonterminal(_))));
  }

  #[test]
  fn rejects_infinite_cycle() {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.add_production("S", vec![nt(&store, "Loop")], None, None, None).unwrap();
    g.add_production("Loop", vec![nt(&store, "Loop")], None, None, None).unwrap();
    assert!(matches!(g.build(), Err(ConfigError::InfiniteCycle(_))));
  }

  #[test]
  fn precedence_after_production_is_rejected() {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.declare_terminal("PLUS");
    g.add_production("S", vec![term(&store, "PLUS")], None, None, None).unwrap();
    assert!(matches!(
      g.set_precedence("PLUS", Assoc::Left, 1),
      Err(ConfigError::PrecedenceDeclaredTooLate { .. })
    ));
  }

  #[test]
  fn unused_terminal_is_reported() {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.declare_terminal("UNUSED");
    g.add_production("S", vec![term(&store, "NUM")], None, None, None).unwrap();
    g.declare_terminal("NUM");
    let grammar = g.build().unwrap();
    let names: Vec<String> = grammar.unused_terminals().iter().map(|t| t.to_string(&store)).collect();
    assert!(names.contains(&"UNUSED".to_string()));
  }

  #[test]
  fn unused_precedence_flags_a_declared_but_dead_terminal() {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.set_precedence_group(Assoc::Left, &["PLUS", "STRAY"]).unwrap();
    g.add_production("S", vec![term(&store, "PLUS")], None, None, None).unwrap();
    let grammar = g.build().unwrap();
    let names: Vec<String> = grammar.unused_precedence().iter().map(|t| t.to_string(&store)).collect();
    assert_eq!(names, vec!["STRAY".to_string()]);
  }
}
