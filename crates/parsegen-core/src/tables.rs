//! The LALR(1) table builder.
//!
//! Four steps: build the canonical LR(0) automaton, propagate
//! DeRemer/Pennello-style lookaheads over it, fill ACTION/GOTO, then
//! resolve conflicts with the precedence lattice and collapse
//! defaulted-reduce states.

use crate::{
  error::GrammarConflict,
  grammar::Grammar,
  items::{ItemGraph, ItemId},
  spec::Assoc,
  symbol::Symbol,
};
use parsegen_runtime::{CachedString, IString, IStringStore, EOF_KIND};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{info, warn};

const DUMMY_LOOKAHEAD: &str = "#lookahead-sentinel#";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionEntry {
  Shift(usize),
  Reduce(usize),
  Accept,
  /// An explicitly installed error, distinct from a missing entry: a
  /// NONASSOC conflict installs ERROR so the grammar forbids chaining. A
  /// *missing* `(state, terminal)` pair is still implicit ERROR, but this
  /// variant records that the slot was deliberately closed off rather than
  /// simply never filled in.
  Error,
}

/// One state of the canonical LR(0) automaton: its kernel (the items that
/// define the state's identity) and the closure computed from it.
pub struct LrState {
  pub kernel:  Vec<ItemId>,
  pub closure: Vec<ItemId>,
}

/// The frozen output of table construction: ACTION/GOTO, defaulted-state
/// fast paths, and the state list needed to print the tables dump.
pub struct ParseTables {
  pub states:      Vec<LrState>,
  pub action:      FxHashMap<(usize, IString), ActionEntry>,
  pub goto:        FxHashMap<(usize, IString), usize>,
  /// state -> the single production every lookahead reduces to.
  pub defaulted:   FxHashMap<usize, usize>,
  pub start_state: usize,
}

impl ParseTables {
  pub fn action(&self, state: usize, terminal: IString) -> Option<ActionEntry> {
    self.action.get(&(state, terminal)).copied()
  }

  pub fn goto(&self, state: usize, nonterm: IString) -> Option<usize> {
    self.goto.get(&(state, nonterm)).copied()
  }

  pub fn defaulted_reduction(&self, state: usize) -> Option<usize> {
    self.defaulted.get(&state).copied()
  }
}

/// Runs the full LALR(1) construction end to end. Returns the tables plus
/// every conflict diagnostic collected along the way (shift/reduce resolved
/// by default or precedence, reduce/reduce, and NONASSOC-installed errors).
pub fn build(grammar: &Grammar, items: &ItemGraph) -> (ParseTables, Vec<GrammarConflict>) {
  let (states, transitions) = build_lr0_automaton(grammar, items);
  let lookaheads = propagate_lookaheads(grammar, items, &states, &transitions);
  let (action, goto, conflicts) = fill_and_resolve(grammar, items, &states, &transitions, &lookaheads);
  let defaulted = detect_defaulted_states(&states, &action);

  info!(
    states = states.len(),
    shift_reduce = conflicts.iter().filter(|c| matches!(c, GrammarConflict::ShiftReduce { .. })).count(),
    reduce_reduce = conflicts.iter().filter(|c| matches!(c, GrammarConflict::ReduceReduce { .. })).count(),
    defaulted = defaulted.len(),
    "built LALR(1) tables"
  );

  (ParseTables { states, action, goto, defaulted, start_state: 0 }, conflicts)
}

// ---------------------------------------------------------------------------
// Step 1: canonical LR(0) automaton.
// ---------------------------------------------------------------------------

fn closure(kernel: &[ItemId], grammar: &Grammar, items: &ItemGraph) -> Vec<ItemId> {
  let mut seen: FxHashSet<ItemId> = kernel.iter().copied().collect();
  let mut out: Vec<ItemId> = kernel.to_vec();
  let mut worklist: Vec<ItemId> = kernel.to_vec();
  while let Some(item) = worklist.pop() {
    for prod in items.after_productions(item, grammar) {
      let initial = items.initial_item(prod);
      if seen.insert(initial) {
        out.push(initial);
        worklist.push(initial);
      }
    }
  }
  out
}

fn kernel_key(items: &ItemGraph, grammar: &Grammar, kernel: &[ItemId]) -> Vec<(usize, usize)> {
  let mut key: Vec<(usize, usize)> =
    kernel.iter().map(|i| (items.production_of(*i), items.dot_of(*i))).collect();
  key.sort_unstable();
  key.dedup();
  let _ = grammar;
  key
}

fn build_lr0_automaton(
  grammar: &Grammar,
  items: &ItemGraph,
) -> (Vec<LrState>, FxHashMap<(usize, Symbol), usize>) {
  let start_kernel = vec![items.initial_item(0)];
  let mut states: Vec<LrState> = Vec::new();
  let mut index_of: FxHashMap<Vec<(usize, usize)>, usize> = FxHashMap::default();
  let mut transitions: FxHashMap<(usize, Symbol), usize> = FxHashMap::default();

  let start_closure = closure(&start_kernel, grammar, items);
  states.push(LrState { kernel: start_kernel.clone(), closure: start_closure });
  index_of.insert(kernel_key(items, grammar, &start_kernel), 0);

  let mut worklist = vec![0usize];
  while let Some(s) = worklist.pop() {
    // Group the closure's shiftable items by the symbol they'd consume.
    let mut by_symbol: FxHashMap<Symbol, Vec<ItemId>> = FxHashMap::default();
    for item in states[s].closure.clone() {
      if let Some(sym) = items.symbol_after_dot(item, grammar) {
        by_symbol.entry(sym).or_default().push(items.next(item, grammar).unwrap());
      }
    }
    for (sym, mut kernel) in by_symbol {
      kernel.sort_unstable_by_key(|i| (items.production_of(*i), items.dot_of(*i)));
      kernel.dedup();
      let key = kernel_key(items, grammar, &kernel);
      let target = *index_of.entry(key).or_insert_with(|| {
        let idx = states.len();
        let c = closure(&kernel, grammar, items);
        states.push(LrState { kernel: kernel.clone(), closure: c });
        worklist.push(idx);
        idx
      });
      transitions.insert((s, sym), target);
    }
  }

  (states, transitions)
}

// ---------------------------------------------------------------------------
// Step 2: DeRemer/Pennello lookahead propagation.
// ---------------------------------------------------------------------------

type LaKey = (usize, ItemId);

/// Closure of a single kernel item annotated with a lookahead symbol (which
/// may be the dummy sentinel `#`). Returns every
/// `(item, lookahead)` pair reachable -- both the ones whose lookahead is
/// "spontaneously generated" (a concrete terminal) and the ones that merely
/// inherit the seed item's own eventual lookahead (tagged with the dummy).
fn lookahead_closure(
  seed: ItemId,
  seed_la: IString,
  grammar: &Grammar,
  items: &ItemGraph,
) -> Vec<(ItemId, IString)> {
  let mut seen: FxHashSet<(ItemId, IString)> = FxHashSet::default();
  let mut out = Vec::new();
  let mut worklist = vec![(seed, seed_la)];
  seen.insert((seed, seed_la));
  out.push((seed, seed_la));

  while let Some((item, la)) = worklist.pop() {
    if items.is_complete(item, grammar) {
      continue;
    }
    let Some(Symbol::NonTerminal(b)) = items.symbol_after_dot(item, grammar) else { continue };
    let prod = items.production_of(item);
    let dot = items.dot_of(item);
    let beta = &grammar.production(prod).rhs[dot + 1..];
    let mut sequence = beta.to_vec();
    sequence.push(Symbol::Terminal(la));
    let (first_set, _) = grammar.first_of_sequence(&sequence);

    for prod_b in grammar.productions_of(b) {
      let new_item = items.initial_item(prod_b.number);
      for t in &first_set {
        if seen.insert((new_item, *t)) {
          out.push((new_item, *t));
          worklist.push((new_item, *t));
        }
      }
    }
  }

  out
}

fn propagate_lookaheads(
  grammar: &Grammar,
  items: &ItemGraph,
  states: &[LrState],
  transitions: &FxHashMap<(usize, Symbol), usize>,
) -> FxHashMap<LaKey, FxHashSet<IString>> {
  let dummy = DUMMY_LOOKAHEAD.to_token(&grammar.store);
  let eof = EOF_KIND.to_token(&grammar.store);

  let mut la: FxHashMap<LaKey, FxHashSet<IString>> = FxHashMap::default();
  la.entry((0, items.initial_item(0))).or_default().insert(eof);

  let mut edges: Vec<(LaKey, LaKey)> = Vec::new();

  for (s, state) in states.iter().enumerate() {
    for &kernel_item in &state.kernel {
      for (item, generated_la) in lookahead_closure(kernel_item, dummy, grammar, items) {
        if item == kernel_item && generated_la == dummy {
          continue;
        }
        if items.is_complete(item, grammar) {
          if generated_la == dummy {
            edges.push(((s, kernel_item), (s, item)));
          } else {
            la.entry((s, item)).or_default().insert(generated_la);
          }
        } else {
          let sym = items.symbol_after_dot(item, grammar).unwrap();
          let Some(&target_state) = transitions.get(&(s, sym)) else { continue };
          let target_item = items.next(item, grammar).unwrap();
          if generated_la == dummy {
            edges.push(((s, kernel_item), (target_state, target_item)));
          } else {
            la.entry((target_state, target_item)).or_default().insert(generated_la);
          }
        }
      }
    }
  }

  loop {
    let mut changed = false;
    for (from, to) in &edges {
      let source = la.get(from).cloned().unwrap_or_default();
      let entry = la.entry(*to).or_default();
      for t in source {
        changed |= entry.insert(t);
      }
    }
    if !changed {
      break;
    }
  }

  la
}

// ---------------------------------------------------------------------------
// Steps 3-4: table fill and conflict resolution.
// ---------------------------------------------------------------------------

enum Proposal {
  Shift(usize),
  Reduce(usize),
  Accept,
}

fn fill_and_resolve(
  grammar: &Grammar,
  items: &ItemGraph,
  states: &[LrState],
  transitions: &FxHashMap<(usize, Symbol), usize>,
  lookaheads: &FxHashMap<LaKey, FxHashSet<IString>>,
) -> (FxHashMap<(usize, IString), ActionEntry>, FxHashMap<(usize, IString), usize>, Vec<GrammarConflict>) {
  let eof = EOF_KIND.to_token(&grammar.store);
  let mut action: FxHashMap<(usize, IString), ActionEntry> = FxHashMap::default();
  let mut goto: FxHashMap<(usize, IString), usize> = FxHashMap::default();
  let mut conflicts = Vec::new();

  for (&(s, sym), &target) in transitions {
    if let Symbol::NonTerminal(nt) = sym {
      goto.insert((s, nt), target);
    }
  }

  for (s, state) in states.iter().enumerate() {
    let mut proposals: FxHashMap<IString, Vec<Proposal>> = FxHashMap::default();

    for &item in &state.closure {
      let prod = items.production_of(item);
      if items.is_complete(item, grammar) {
        if prod == 0 {
          proposals.entry(eof).or_default().push(Proposal::Accept);
          continue;
        }
        for t in lookaheads.get(&(s, item)).into_iter().flatten() {
          proposals.entry(*t).or_default().push(Proposal::Reduce(prod));
        }
      } else if let Some(Symbol::Terminal(t)) = items.symbol_after_dot(item, grammar) {
        if let Some(&target) = transitions.get(&(s, Symbol::Terminal(t))) {
          proposals.entry(t).or_default().push(Proposal::Shift(target));
        }
      }
    }

    for (terminal, mut entries) in proposals {
      if entries.iter().any(|p| matches!(p, Proposal::Accept)) {
        action.insert((s, terminal), ActionEntry::Accept);
        continue;
      }

      let mut reduces: Vec<usize> =
        entries.iter().filter_map(|p| if let Proposal::Reduce(p) = p { Some(*p) } else { None }).collect();
      reduces.sort_unstable();
      let shift = entries.iter().find_map(|p| if let Proposal::Shift(s) = p { Some(*s) } else { None });
      entries.clear();

      let kept_reduce = reduces.first().copied();
      for &dropped in reduces.iter().skip(1) {
        conflicts.push(GrammarConflict::ReduceReduce {
          state:              s,
          terminal:           terminal.to_string(&grammar.store),
          kept_production:    kept_reduce.unwrap(),
          dropped_production: dropped,
        });
      }

      let resolved = match (shift, kept_reduce) {
        (Some(target), None) => ActionEntry::Shift(target),
        (None, Some(p)) => ActionEntry::Reduce(p),
        (None, None) => continue,
        (Some(target), Some(p)) => {
          resolve_shift_reduce(grammar, &mut conflicts, s, terminal, target, p)
        }
      };
      action.insert((s, terminal), resolved);
    }
  }

  (action, goto, conflicts)
}

fn resolve_shift_reduce(
  grammar: &Grammar,
  conflicts: &mut Vec<GrammarConflict>,
  state: usize,
  terminal: IString,
  shift_to: usize,
  reduce_production: usize,
) -> ActionEntry {
  let term_prec = grammar.precedence.get(&terminal).copied();
  let prod_prec = grammar.production(reduce_production).precedence;
  let terminal_name = terminal.to_string(&grammar.store);

  let resolved_as_shift = match (term_prec, prod_prec) {
    (None, None) => true,
    (Some(_), None) => true,
    (None, Some(_)) => false,
    (Some(t), Some(p)) => {
      if t.level != p.level {
        t.level > p.level
      } else {
        match t.assoc {
          Assoc::Left => false,
          Assoc::Right => true,
          Assoc::NonAssoc => {
            warn!(state, terminal = %terminal_name, "NONASSOC forbids chaining here; installing ERROR");
            conflicts.push(GrammarConflict::NonAssocError { state, terminal: terminal_name });
            return ActionEntry::Error;
          }
        }
      }
    }
  };

  warn!(
    state,
    terminal = %terminal_name,
    shift_to,
    reduce_production,
    resolved_as_shift,
    "shift/reduce conflict"
  );
  conflicts.push(GrammarConflict::ShiftReduce {
    state,
    terminal: terminal_name,
    shift_to,
    reduce_production,
    resolved_as_shift,
  });

  if resolved_as_shift { ActionEntry::Shift(shift_to) } else { ActionEntry::Reduce(reduce_production) }
}

// ---------------------------------------------------------------------------
// Step 5: defaulted-state detection.
// ---------------------------------------------------------------------------

fn detect_defaulted_states(
  states: &[LrState],
  action: &FxHashMap<(usize, IString), ActionEntry>,
) -> FxHashMap<usize, usize> {
  let mut by_state: FxHashMap<usize, Vec<ActionEntry>> = FxHashMap::default();
  for (&(s, _), entry) in action {
    by_state.entry(s).or_default().push(*entry);
  }

  let mut defaulted = FxHashMap::default();
  for (s, _) in states.iter().enumerate() {
    let Some(entries) = by_state.get(&s) else { continue };
    if entries.is_empty() {
      continue;
    }
    let mut common: Option<usize> = None;
    let mut uniform = true;
    for entry in entries {
      match entry {
        ActionEntry::Reduce(p) => match common {
          None => common = Some(*p),
          Some(c) if c == *p => {}
          _ => {
            uniform = false;
            break;
          }
        },
        _ => {
          uniform = false;
          break;
        }
      }
    }
    if uniform {
      if let Some(p) = common {
        defaulted.insert(s, p);
      }
    }
  }
  defaulted
}
